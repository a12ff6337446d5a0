//! Reply segmentation.
//!
//! Splits a long reply into lines that fit the transport's line budget.
//! Sentences are packed greedily; a sentence that is too long on its own is
//! packed word by word. Words are never split, so a single word longer than
//! the budget is emitted as its own oversized chunk.
//!
//! Lengths are byte lengths, which is what the IRC line limit counts.

use regex::Regex;
use std::str::SplitWhitespace;
use std::sync::LazyLock;

/// One or more sentence terminators followed by whitespace.
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence pattern"));

/// Split `text` into chunks of at most `max_len` bytes.
///
/// The returned iterator is lazy. It is `Clone`, so a consumer can restart
/// it from a saved copy or simply call `segment` again.
pub fn segment(text: &str, max_len: usize) -> Segments<'_> {
    let short = text.len() <= max_len;
    Segments {
        whole: (short && !text.is_empty()).then_some(text),
        rest: if short { "" } else { text },
        words: None,
        current: String::new(),
        max_len,
    }
}

/// Iterator over the chunks of a segmented reply.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    /// Text short enough to go out unchanged
    whole: Option<&'a str>,
    /// Text not yet cut into sentence fragments
    rest: &'a str,
    /// Words of an oversized sentence still being packed
    words: Option<SplitWhitespace<'a>>,
    /// Chunk being accumulated
    current: String,
    max_len: usize,
}

impl<'a> Segments<'a> {
    /// Next sentence fragment, terminators kept, surrounding whitespace dropped.
    fn next_fragment(&mut self) -> Option<&'a str> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            let fragment = match SENTENCE_BREAK.find(self.rest) {
                Some(m) => {
                    let terminators = m.as_str().trim_end().len();
                    let fragment = &self.rest[..m.start() + terminators];
                    self.rest = &self.rest[m.end()..];
                    fragment
                }
                None => std::mem::take(&mut self.rest),
            };

            let fragment = fragment.trim();
            if !fragment.is_empty() {
                return Some(fragment);
            }
        }
    }

    /// Add a piece to the current chunk, returning the flushed chunk when the
    /// piece does not fit.
    fn push(&mut self, piece: &str) -> Option<String> {
        if self.current.is_empty() {
            self.current.push_str(piece);
            return None;
        }

        if self.current.len() + 1 + piece.len() <= self.max_len {
            self.current.push(' ');
            self.current.push_str(piece);
            return None;
        }

        Some(std::mem::replace(&mut self.current, piece.to_string()))
    }

    fn flush(&mut self) -> Option<String> {
        (!self.current.is_empty()).then(|| std::mem::take(&mut self.current))
    }
}

impl Iterator for Segments<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(text) = self.whole.take() {
            return Some(text.to_string());
        }

        loop {
            if let Some(words) = self.words.as_mut() {
                match words.next() {
                    Some(word) => {
                        if let Some(chunk) = self.push(word) {
                            return Some(chunk);
                        }
                    }
                    None => self.words = None,
                }
                continue;
            }

            let Some(fragment) = self.next_fragment() else {
                return self.flush();
            };

            if fragment.len() > self.max_len {
                // Oversized sentence: close the running chunk, then pack words.
                self.words = Some(fragment.split_whitespace());
                if let Some(chunk) = self.flush() {
                    return Some(chunk);
                }
                continue;
            }

            if let Some(chunk) = self.push(fragment) {
                return Some(chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(text: &str, max_len: usize) -> Vec<String> {
        segment(text, max_len).collect()
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(chunks("Hello, World!", 400), vec!["Hello, World!"]);
        assert_eq!(chunks("exactly ten", 11), vec!["exactly ten"]);
    }

    #[test]
    fn test_short_text_is_unchanged() {
        let text = "keeps  double  spaces. And more!";
        assert_eq!(chunks(text, 400), vec![text]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunks("", 400).is_empty());
        assert!(chunks("", 0).is_empty());
    }

    #[test]
    fn test_sentences_packed_greedily() {
        let text = "One two. Three four! Five six? Seven.";
        assert_eq!(
            chunks(text, 20),
            vec!["One two. Three four!", "Five six? Seven."]
        );
    }

    #[test]
    fn test_terminator_runs_kept() {
        let text = "Really?! Yes... Okay.";
        assert_eq!(chunks(text, 10), vec!["Really?!", "Yes...", "Okay."]);
    }

    #[test]
    fn test_long_sentence_falls_back_to_words() {
        let text = "Short one. This sentence is definitely longer than the limit allows. End.";
        let result = chunks(text, 20);

        assert_eq!(result[0], "Short one.");
        for chunk in &result {
            assert!(chunk.len() <= 20, "chunk too long: {chunk:?}");
        }
        assert_eq!(normalize(&result.join(" ")), normalize(text));
    }

    #[test]
    fn test_word_tail_joins_next_sentence() {
        let text = "aaaa bbbb cccc dddd. ee.";
        assert_eq!(chunks(text, 10), vec!["aaaa bbbb", "cccc dddd.", "ee."]);
    }

    #[test]
    fn test_oversized_word_emitted_whole() {
        let long_word = "x".repeat(30);
        let text = format!("tiny {long_word} words here");
        let result = chunks(&text, 10);

        assert_eq!(result, vec!["tiny".to_string(), long_word, "words here".into()]);
    }

    #[test]
    fn test_chunks_respect_limit_and_rejoin() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. \
                    Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua! \
                    Ut enim ad minim veniam, quis nostrud exercitation ullamco laboris \
                    nisi ut aliquip ex ea commodo consequat? Duis aute irure dolor.";

        for max_len in [15, 30, 64, 100] {
            let result = chunks(text, max_len);
            assert!(result.len() > 1);
            for chunk in &result {
                assert!(!chunk.is_empty());
                assert!(chunk.len() <= max_len, "{max_len}: {chunk:?}");
            }
            assert_eq!(normalize(&result.join(" ")), normalize(text));
        }
    }

    #[test]
    fn test_newlines_are_whitespace() {
        let text = "First line.\nSecond line.\n\nThird line here.";
        let result = chunks(text, 25);
        assert_eq!(result, vec!["First line. Second line.", "Third line here."]);
    }

    #[test]
    fn test_restartable() {
        let text = "One two. Three four! Five six? Seven.";
        let segments = segment(text, 20);
        let first: Vec<String> = segments.clone().collect();
        let second: Vec<String> = segments.collect();
        assert_eq!(first, second);
        assert_eq!(first, chunks(text, 20));
    }

    #[test]
    fn test_lazy_partial_consumption() {
        let text = "One two. Three four! Five six? Seven.";
        let mut segments = segment(text, 8);
        assert_eq!(segments.next().as_deref(), Some("One two."));
        let rest: Vec<String> = segments.collect();
        assert_eq!(rest.first().map(String::as_str), Some("Three"));
    }

    #[test]
    fn test_long_text_of_spaces_only() {
        let text = " ".repeat(50);
        assert!(chunks(&text, 10).is_empty());
    }
}
