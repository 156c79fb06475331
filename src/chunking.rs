//! Reply chunking for speech synthesis
//!
//! The speech model rejects long input, so replies are split on sentence
//! boundaries and packed greedily into segments of at most
//! [`SPEECH_CHUNK_LIMIT`] characters.

use crate::services::truncate_chars;

/// Default segment length, leaving headroom under the model's input cap
pub const SPEECH_CHUNK_LIMIT: usize = 180;

const fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

/// Split text into trimmed sentences
///
/// A sentence is a run of non-terminator characters followed by any
/// terminators (`.`, `!`, `?`). Terminators before the first sentence are
/// dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = None;
    let mut in_terminators = false;

    for (idx, c) in text.char_indices() {
        let terminator = is_terminator(c);
        match start {
            None if !terminator => {
                start = Some(idx);
                in_terminators = false;
            }
            None => {}
            Some(_) if terminator => in_terminators = true,
            Some(s) if in_terminators => {
                sentences.push(&text[s..idx]);
                start = Some(idx);
                in_terminators = false;
            }
            Some(_) => {}
        }
    }

    if let Some(s) = start {
        sentences.push(&text[s..]);
    }

    sentences
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Pack sentences into segments of at most `limit` characters
///
/// Sentences are joined with a single space. A sentence longer than `limit`
/// on its own is truncated to `limit` characters.
#[must_use]
pub fn chunk_for_speech(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text.trim()) {
        let len = sentence.chars().count();
        let joined_len = if current.is_empty() {
            len
        } else {
            current_len + 1 + len
        };

        if joined_len > limit {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = truncate_chars(sentence, limit).to_string();
            current_len = len.min(limit);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_len = joined_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_terminators() {
        assert_eq!(
            split_sentences("Hello there! How are you? Fine..."),
            vec!["Hello there!", "How are you?", "Fine..."]
        );
    }

    #[test]
    fn test_split_without_terminator() {
        assert_eq!(split_sentences("  no punctuation here "), vec!["no punctuation here"]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_split_drops_leading_terminators() {
        assert_eq!(split_sentences("?! ok."), vec!["ok."]);
    }

    #[test]
    fn test_short_reply_is_one_chunk() {
        assert_eq!(chunk_for_speech("Hi. Bye.", SPEECH_CHUNK_LIMIT), vec!["Hi. Bye."]);
        assert!(chunk_for_speech("", SPEECH_CHUNK_LIMIT).is_empty());
    }

    #[test]
    fn test_chunks_respect_limit() {
        let sentence = "This sentence is exactly forty chars ok.";
        assert_eq!(sentence.len(), 40);
        let text = [sentence; 10].join(" ");

        let chunks = chunk_for_speech(&text, SPEECH_CHUNK_LIMIT);
        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= SPEECH_CHUNK_LIMIT);
        }
        // Four sentences plus three separators
        assert_eq!(chunks[0].len(), 163);
    }

    #[test]
    fn test_oversized_sentence_truncated() {
        let long = format!("{}.", "é".repeat(300));
        let chunks = chunk_for_speech(&format!("Short. {long} Tail."), SPEECH_CHUNK_LIMIT);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "Short.");
        assert_eq!(chunks[1].chars().count(), SPEECH_CHUNK_LIMIT);
        assert_eq!(chunks[2], "Tail.");
    }
}
