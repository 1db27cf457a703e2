use serde::{Deserialize, Serialize};

/// Placeholder pacing when the voiceover duration is not known yet. The
/// windows are still proportional and contiguous, only the assumed total
/// (`5s * scene count`) is a display convention.
pub const DEFAULT_SCENE_SECONDS: f64 = 5.0;

const SENTENCE_ENDERS: &[char] = &['.', '!', '?', '…', '。', '！', '？'];
const CLAUSE_ENDERS: &[char] = &[',', ';', ':', '，', '；', '：', '、'];

/// One narrated segment of the script with its time window. Scenes are
/// created in one shot by [`allocate`] and never patched; editing the script
/// or learning a new audio duration replaces the whole sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakTier {
    Sentence,
    Clause,
    Word,
}

struct BreakPoint {
    /// Byte offset of the first char of the word after the break.
    byte: usize,
    /// Non-whitespace chars before this offset, used as the proportional axis.
    cum: usize,
    tier: BreakTier,
}

/// Partitions `script` into at most `scene_count` contiguous, non-empty
/// chunks and assigns each a time window.
///
/// The chunks are exact substrings of `script` (trailing whitespace stays
/// with the preceding chunk), so concatenating every scene's `text` in order
/// reproduces the input byte for byte. Cut points prefer sentence-ending
/// breaks near the proportional target, then clause breaks, then plain word
/// boundaries; a word is never split. When the script has fewer words than
/// `scene_count`, the effective count shrinks instead of emitting empty
/// scenes.
///
/// With `audio_duration_seconds > 0` the duration is distributed in
/// proportion to each chunk's non-whitespace character count, windows
/// contiguous from zero and the final `end_seconds` equal to the duration.
/// Without a known duration the same distribution runs over an assumed total
/// of [`DEFAULT_SCENE_SECONDS`] per scene.
///
/// Deterministic for identical inputs; an empty or whitespace-only script
/// yields an empty vector rather than an error.
pub fn allocate(script: &str, scene_count: usize, audio_duration_seconds: f64) -> Vec<Scene> {
    if script.trim().is_empty() {
        return Vec::new();
    }

    let (breaks, nonws_total) = scan_breaks(script);
    let n = scene_count.max(1).min(breaks.len() + 1);

    let cuts = choose_cuts(&breaks, nonws_total, n);

    let mut bounds = Vec::with_capacity(n + 1);
    bounds.push(0);
    bounds.extend(cuts);
    bounds.push(script.len());

    let texts: Vec<&str> = bounds.windows(2).map(|w| &script[w[0]..w[1]]).collect();
    let weights: Vec<f64> = texts
        .iter()
        .map(|t| t.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64)
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    let total = if audio_duration_seconds.is_finite() && audio_duration_seconds > 0.0 {
        audio_duration_seconds
    } else {
        DEFAULT_SCENE_SECONDS * n as f64
    };

    let mut scenes = Vec::with_capacity(n);
    let mut cum = 0.0;
    let mut start = 0.0;
    for (i, (text, weight)) in texts.iter().zip(&weights).enumerate() {
        cum += weight;
        let end = if i == n - 1 {
            // Pin the last window to the exact total instead of accumulating
            // floating point drift.
            total
        } else {
            total * cum / weight_sum
        };
        scenes.push(Scene {
            index: i,
            text: (*text).to_string(),
            start_seconds: start,
            end_seconds: end,
        });
        start = end;
    }
    scenes
}

fn scan_breaks(script: &str) -> (Vec<BreakPoint>, usize) {
    let mut breaks = Vec::new();
    let mut prev: Option<char> = None;
    let mut last_nonws: Option<char> = None;
    let mut nonws = 0usize;

    for (i, ch) in script.char_indices() {
        if !ch.is_whitespace() {
            // A boundary only exists between two words; leading whitespace
            // belongs to the first chunk and is never a cut point.
            if matches!(prev, Some(p) if p.is_whitespace()) && last_nonws.is_some() {
                let tier = match last_nonws {
                    Some(c) if SENTENCE_ENDERS.contains(&c) => BreakTier::Sentence,
                    Some(c) if CLAUSE_ENDERS.contains(&c) => BreakTier::Clause,
                    _ => BreakTier::Word,
                };
                breaks.push(BreakPoint {
                    byte: i,
                    cum: nonws,
                    tier,
                });
            }
            last_nonws = Some(ch);
            nonws += 1;
        }
        prev = Some(ch);
    }
    (breaks, nonws)
}

/// Greedy left-to-right cut selection: each cut takes the best break near its
/// proportional target while leaving enough break points for the cuts still
/// to come.
fn choose_cuts(breaks: &[BreakPoint], nonws_total: usize, n: usize) -> Vec<usize> {
    if n < 2 {
        return Vec::new();
    }
    let total = nonws_total as f64;
    // "Close enough" for a sentence/clause break: half a chunk either way.
    let window = total / (2.0 * n as f64);

    let mut cuts = Vec::with_capacity(n - 1);
    let mut lo = 0usize;
    for k in 1..n {
        let hi = breaks.len() - (n - k);
        let target = total * k as f64 / n as f64;
        let pick = lo + best_break(&breaks[lo..=hi], target, window);
        cuts.push(breaks[pick].byte);
        lo = pick + 1;
    }
    cuts
}

fn best_break(candidates: &[BreakPoint], target: f64, window: f64) -> usize {
    for tier in [BreakTier::Sentence, BreakTier::Clause] {
        let within = candidates
            .iter()
            .enumerate()
            .filter(|(_, b)| b.tier == tier)
            .map(|(i, b)| (i, (b.cum as f64 - target).abs()))
            .filter(|(_, d)| *d <= window)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = within {
            return i;
        }
    }
    candidates
        .iter()
        .enumerate()
        .map(|(i, b)| (i, (b.cum as f64 - target).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn rejoin(scenes: &[Scene]) -> String {
        scenes.iter().map(|s| s.text.as_str()).collect()
    }

    #[test]
    fn test_empty_script_yields_no_scenes() {
        assert!(allocate("", 5, 10.0).is_empty());
        assert!(allocate("   \n\t ", 5, 10.0).is_empty());
    }

    #[test]
    fn test_concatenation_reconstructs_script() {
        let script = "The sun rose over the hills. Birds began to sing,\nand the village woke slowly. A new day had begun!";
        for n in 1..=6 {
            let scenes = allocate(script, n, 12.0);
            assert_eq!(rejoin(&scenes), script, "scene_count = {}", n);
        }
    }

    #[test]
    fn test_windows_contiguous_and_monotonic() {
        let script = "One two three four five six seven eight nine ten.";
        let scenes = allocate(script, 4, 9.5);
        assert!((scenes[0].start_seconds - 0.0).abs() < EPS);
        for pair in scenes.windows(2) {
            assert!((pair[0].end_seconds - pair[1].start_seconds).abs() < EPS);
        }
        for s in &scenes {
            assert!(s.start_seconds < s.end_seconds);
        }
        assert!((scenes.last().unwrap().end_seconds - 9.5).abs() < EPS);
    }

    #[test]
    fn test_idempotent() {
        let script = "Rain fell. Thunder rolled. Lightning struck the old oak.";
        let a = allocate(script, 3, 7.0);
        let b = allocate(script, 3, 7.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_four_even_sentences() {
        // "A. B. C. D." with equal weights splits 8 seconds into four 2s windows.
        let scenes = allocate("A. B. C. D.", 4, 8.0);
        assert_eq!(scenes.len(), 4);
        let expected = [(0.0, 2.0), (2.0, 4.0), (4.0, 6.0), (6.0, 8.0)];
        for (s, (start, end)) in scenes.iter().zip(expected) {
            assert!((s.start_seconds - start).abs() < EPS);
            assert!((s.end_seconds - end).abs() < EPS);
        }
        assert!((scenes.last().unwrap().end_seconds - 8.0).abs() < EPS);
    }

    #[test]
    fn test_prefers_sentence_breaks() {
        let script =
            "First sentence here. Second sentence here. Third sentence here. Fourth sentence here.";
        let scenes = allocate(script, 2, 10.0);
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].text, "First sentence here. Second sentence here. ");
        assert_eq!(scenes[1].text, "Third sentence here. Fourth sentence here.");
    }

    #[test]
    fn test_never_splits_inside_a_word() {
        let script = "supercalifragilistic expialidocious antidisestablishmentarianism";
        let scenes = allocate(script, 3, 6.0);
        for s in &scenes {
            assert!(!s.text.trim().is_empty());
            // Every chunk after the first starts at a word start.
            if s.index > 0 {
                assert!(!s.text.starts_with(char::is_whitespace));
            }
        }
        assert_eq!(rejoin(&scenes), script);
    }

    #[test]
    fn test_leading_whitespace_never_becomes_a_scene() {
        // LLM output routinely starts with a newline; the whitespace belongs
        // to the first chunk and must not become a cut point.
        let scenes = allocate(" a b", 3, 6.0);
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].text, " a ");
        assert_eq!(scenes[1].text, "b");

        let scenes = allocate("\nOne two three", 4, 8.0);
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].text, "\nOne ");
        for s in &scenes {
            assert!(!s.text.trim().is_empty());
        }
        assert_eq!(rejoin(&scenes), "\nOne two three");
    }

    #[test]
    fn test_short_script_reduces_scene_count() {
        let scenes = allocate("one two", 5, 10.0);
        assert_eq!(scenes.len(), 2);
        let scenes = allocate("single", 4, 10.0);
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].text, "single");
    }

    #[test]
    fn test_unknown_duration_uses_placeholder_total() {
        let scenes = allocate("Alpha beta gamma delta.", 2, 0.0);
        assert_eq!(scenes.len(), 2);
        assert!((scenes[0].start_seconds - 0.0).abs() < EPS);
        assert!(
            (scenes.last().unwrap().end_seconds - DEFAULT_SCENE_SECONDS * 2.0).abs() < EPS
        );
        for pair in scenes.windows(2) {
            assert!((pair[0].end_seconds - pair[1].start_seconds).abs() < EPS);
        }
    }

    #[test]
    fn test_longer_text_gets_longer_window() {
        // Three words, three scenes: cuts are forced at the word starts, so
        // the windows follow the 1/2/4 character weights.
        let scenes = allocate("a bb cccc", 3, 7.0);
        assert_eq!(scenes.len(), 3);
        let width = |s: &Scene| s.end_seconds - s.start_seconds;
        assert!((width(&scenes[0]) - 1.0).abs() < EPS);
        assert!((width(&scenes[1]) - 2.0).abs() < EPS);
        assert!((width(&scenes[2]) - 4.0).abs() < EPS);
    }
}
