use crate::batch::{GenerationSlot, SlotStatus};
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::Path;

/// Turns a user-supplied file into a completed slot carrying a data URL.
/// Uploaded slots behave exactly like remote-generated ones downstream; the
/// `uploaded` flag only records their origin.
pub fn slot_from_file(index: usize, path: &Path) -> Result<GenerationSlot> {
    let mime = mime_for(path)?;
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read uploaded file {:?}", path))?;
    if data.is_empty() {
        bail!("Uploaded file {:?} is empty", path);
    }

    let mut slot = GenerationSlot::pending(index);
    slot.status = SlotStatus::Completed;
    slot.url = Some(format!("data:{};base64,{}", mime, STANDARD.encode(&data)));
    slot.uploaded = true;
    Ok(slot)
}

fn mime_for(path: &Path) -> Result<&'static str> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        other => bail!("Unsupported upload type: .{}", other),
    };
    Ok(mime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_file_becomes_completed_uploaded_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        fs::write(&path, b"\x89PNG fake bytes").unwrap();

        let slot = slot_from_file(3, &path).unwrap();
        assert_eq!(slot.index, 3);
        assert_eq!(slot.status, SlotStatus::Completed);
        assert!(slot.uploaded);
        assert!(slot.error.is_none());
        let url = slot.url.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();
        assert!(slot_from_file(0, &path).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        fs::write(&path, b"").unwrap();
        assert!(slot_from_file(0, &path).is_err());
    }
}
