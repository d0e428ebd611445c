//! Sentence-aware paragraph segmenter.
//!
//! Splits extracted text into sentences (Unicode sentence boundaries,
//! UAX #29) and regroups them into [`TextUnit`]s bounded by a word count.
//! A paragraph is closed right after the sentence that pushes its word
//! count past the limit, so no sentence is ever split.

use unicode_segmentation::UnicodeSegmentation;

use crate::models::TextUnit;

/// Sentences of `text`, trimmed, with whitespace-only spans dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Group sentences into paragraphs of roughly `word_limit` words.
/// Returns units with contiguous indices starting at 0; empty input yields
/// an empty vector.
pub fn segment(text: &str, word_limit: usize) -> Vec<TextUnit> {
    let mut units = Vec::new();
    let mut current = String::new();
    let mut current_words = 0usize;

    for sentence in split_sentences(text) {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(sentence);
        current_words += word_count(sentence);

        if current_words > word_limit {
            push_unit(&mut units, &current, current_words);
            current.clear();
            current_words = 0;
        }
    }

    if !current.trim().is_empty() {
        push_unit(&mut units, &current, current_words);
    }

    units
}

fn push_unit(units: &mut Vec<TextUnit>, text: &str, word_count: usize) {
    units.push(TextUnit {
        index: units.len(),
        text: text.trim().to_string(),
        word_count,
    });
}
