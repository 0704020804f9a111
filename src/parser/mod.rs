//! Sentence/word parser used by the storage node's file engine
//! (spec.md S4.4), ported from
//! `examples/original_source/osn_final/project-main/src/sentence_parser.c`.

use crate::error::{ErrorCode, ServerError};

/// A single sentence cannot exceed this many characters before being
/// forcibly cut, mirroring `MAX_SENTENCE_LENGTH` in the original
/// `common.h`.
pub const MAX_SENTENCE_LENGTH: usize = 1024;
/// A single word is truncated beyond this many characters, mirroring
/// `MAX_WORD_LENGTH`.
pub const MAX_WORD_LENGTH: usize = 128;

/// Splits `text` into sentences at `.`, `!`, or `?`. Each produced
/// sentence includes its terminator and is trimmed of leading/trailing
/// whitespace. Trailing text without a terminator forms a final
/// sentence. Overlong runs are forcibly cut at [`MAX_SENTENCE_LENGTH`].
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);

        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
            continue;
        }

        if current.chars().count() >= MAX_SENTENCE_LENGTH - 1 {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }

    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }

    sentences
}

/// Splits `sentence` on whitespace; empty runs are ignored and each
/// word is truncated to [`MAX_WORD_LENGTH`] characters.
pub fn split_words(sentence: &str) -> Vec<String> {
    sentence
        .split_whitespace()
        .map(|w| w.chars().take(MAX_WORD_LENGTH - 1).collect())
        .collect()
}

/// Rejoins sentences with a single space, per spec.md S4.4.
pub fn rebuild_text(sentences: &[String]) -> String {
    sentences.join(" ")
}

/// Inserts `new_word` at `word_index` within `sentence`'s word
/// sequence. `word_index == word_count` appends at the end. Returns
/// [`ErrorCode::InvalidIndex`] if out of range.
pub fn insert_word(sentence: &str, word_index: usize, new_word: &str) -> Result<String, ServerError> {
    let mut words = split_words(sentence);
    if word_index > words.len() {
        return Err(ServerError::new(
            ErrorCode::InvalidIndex,
            format!("word index {word_index} out of range (0..={})", words.len()),
        ));
    }
    words.insert(word_index, new_word.to_string());
    Ok(words.join(" "))
}

/// Text statistics as defined in spec.md S4.4: `char_count` is the
/// total byte length of `text`; `word_count` sums the words of every
/// sentence; `sentence_count` is the number of sentences produced.
pub struct Stats {
    pub word_count: usize,
    pub char_count: usize,
    pub sentence_count: usize,
}

pub fn stats(text: &str) -> Stats {
    let sentences = split_sentences(text);
    let word_count = sentences.iter().map(|s| split_words(s).len()).sum();
    Stats { word_count, char_count: text.len(), sentence_count: sentences.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_terminated_sentences_and_trims_whitespace() {
        let sentences = split_sentences("Hi there.  New sentence!  Trailing");
        assert_eq!(sentences, vec!["Hi there.", "New sentence!", "Trailing"]);
    }

    #[test]
    fn single_sentence_with_no_terminator_is_kept_whole() {
        assert_eq!(split_sentences("Hi there"), vec!["Hi there"]);
    }

    #[test]
    fn words_split_on_whitespace_and_ignore_empty_runs() {
        assert_eq!(split_words("Hello   World  "), vec!["Hello", "World"]);
    }

    #[test]
    fn rebuild_joins_with_single_spaces() {
        let sentences = vec!["Hi there.".to_string(), "New sentence!".to_string()];
        assert_eq!(rebuild_text(&sentences), "Hi there. New sentence!");
    }

    #[test]
    fn insert_word_appends_at_word_count() {
        let out = insert_word("Hello World", 2, "Again").unwrap();
        assert_eq!(out, "Hello World Again");
    }

    #[test]
    fn insert_word_splices_in_the_middle() {
        let out = insert_word("Hello World", 1, "Brave").unwrap();
        assert_eq!(out, "Hello Brave World");
    }

    #[test]
    fn insert_word_rejects_out_of_range_index() {
        let err = insert_word("Hello World", 5, "x").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidIndex);
    }

    #[test]
    fn insert_word_containing_a_terminator_can_split_on_reparse() {
        // spec.md S3: inserting a word that carries a sentence
        // terminator mid-result causes the reparsed sentence to split
        // into several on rebuild.
        let edited = insert_word("Hi there", 1, "Stop.").unwrap();
        let edited = insert_word(&edited, 3, "after").unwrap();
        assert_eq!(edited, "Hi Stop. there after");
        let resplit = split_sentences(&edited);
        assert_eq!(resplit, vec!["Hi Stop.", "there after"]);
    }

    #[test]
    fn stats_counts_words_chars_and_sentences() {
        let s = stats("Hi there. New sentence!");
        assert_eq!(s.sentence_count, 2);
        assert_eq!(s.word_count, 4);
        assert_eq!(s.char_count, "Hi there. New sentence!".len());
    }
}
