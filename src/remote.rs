use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Errors crossing the remote-generator boundary. Cancellation is not a
/// failure; callers must branch on it before recording slot errors.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("request cancelled")]
    Cancelled,
    #[error("remote generator returned {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("unrecognized response shape: {0}")]
    Decode(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Cooperative cancellation token. One token is scoped to a single
/// `run`/`regenerate` invocation and never reused across two in-flight
/// operations; clones observe the same flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Pends forever otherwise, so it
    /// is only useful inside `tokio::select!` against an in-flight call.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone means nobody can cancel anymore.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes the text payload of a prompt-synthesis response. Providers answer
/// in one of three shapes: `{content:[{text}]}`, `{choices:[{message:{content}}]}`,
/// or a bare string. Anything else is a decode failure for that slot.
pub fn extract_text(value: &Value) -> Result<String, GenerateError> {
    if let Some(s) = value.as_str() {
        return Ok(s.to_string());
    }
    if let Some(text) = value
        .get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(Value::as_str)
    {
        return Ok(text.to_string());
    }
    if let Some(text) = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
    {
        return Ok(text.to_string());
    }
    Err(GenerateError::Decode(truncate_for_log(value)))
}

/// Decodes an asset URL out of a generation response. Known shapes:
/// `data[0].url`, `audio_url`, `audioUrl`, `url`, or a bare string.
pub fn extract_asset_url(value: &Value) -> Result<String, GenerateError> {
    let candidate = value
        .as_str()
        .or_else(|| {
            value
                .get("data")
                .and_then(|d| d.get(0))
                .and_then(|e| e.get("url"))
                .and_then(Value::as_str)
        })
        .or_else(|| value.get("audio_url").and_then(Value::as_str))
        .or_else(|| value.get("audioUrl").and_then(Value::as_str))
        .or_else(|| value.get("url").and_then(Value::as_str));

    match candidate {
        Some(s) if is_resolvable_url(s) => Ok(s.to_string()),
        Some(s) => Err(GenerateError::Decode(format!("unresolvable asset URL: {}", s))),
        None => Err(GenerateError::Decode(truncate_for_log(value))),
    }
}

fn is_resolvable_url(s: &str) -> bool {
    s.starts_with("data:") || url::Url::parse(s).is_ok()
}

fn truncate_for_log(value: &Value) -> String {
    let s = value.to_string();
    if s.chars().count() > 200 {
        let mut out: String = s.chars().take(200).collect();
        out.push_str("...");
        out
    } else {
        s
    }
}

/// Converts a non-2xx response into a slot error, pulling the message out of
/// an optional `{error | message}` JSON body.
pub async fn provider_error(resp: reqwest::Response) -> GenerateError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            let field = v.get("error").or_else(|| v.get("message"))?.clone();
            match field {
                Value::String(s) => Some(s),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }
        })
        .unwrap_or_else(|| "remote generator request failed".to_string());
    GenerateError::Provider { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_content_blocks() {
        let v = json!({"content": [{"text": "a cinematic shot"}]});
        assert_eq!(extract_text(&v).unwrap(), "a cinematic shot");
    }

    #[test]
    fn test_extract_text_chat_choices() {
        let v = json!({"choices": [{"message": {"content": "hello"}}]});
        assert_eq!(extract_text(&v).unwrap(), "hello");
    }

    #[test]
    fn test_extract_text_bare_string() {
        let v = json!("just text");
        assert_eq!(extract_text(&v).unwrap(), "just text");
    }

    #[test]
    fn test_extract_text_rejects_unknown_shape() {
        let v = json!({"output": "nope"});
        assert!(matches!(extract_text(&v), Err(GenerateError::Decode(_))));
    }

    #[test]
    fn test_extract_asset_url_shapes() {
        let shapes = vec![
            json!({"data": [{"url": "https://cdn.example.com/img.png"}]}),
            json!({"audio_url": "https://cdn.example.com/img.png"}),
            json!({"audioUrl": "https://cdn.example.com/img.png"}),
            json!({"url": "https://cdn.example.com/img.png"}),
            json!("https://cdn.example.com/img.png"),
        ];
        for v in shapes {
            assert_eq!(
                extract_asset_url(&v).unwrap(),
                "https://cdn.example.com/img.png"
            );
        }
    }

    #[test]
    fn test_extract_asset_url_accepts_data_urls() {
        let v = json!({"url": "data:image/png;base64,iVBORw0KGgo="});
        assert!(extract_asset_url(&v).is_ok());
    }

    #[test]
    fn test_extract_asset_url_rejects_garbage() {
        assert!(matches!(
            extract_asset_url(&json!({"status": "ok"})),
            Err(GenerateError::Decode(_))
        ));
        assert!(matches!(
            extract_asset_url(&json!({"url": "not a url at all"})),
            Err(GenerateError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_token_flag() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        // Already-cancelled token resolves immediately.
        clone.cancelled().await;
    }
}
