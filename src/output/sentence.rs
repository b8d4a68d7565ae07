//! Sentence segmentation for synthesized replies.

/// Split `text` into sentences on the configured delimiter characters.
///
/// Delimiters stay attached to their sentence, runs of delimiters ("...",
/// "?!") do not produce extra fragments, and fragments with no spoken
/// content are dropped.
pub(crate) fn split_sentences(text: &str, delimiters: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut at_boundary = false;

    for c in text.chars() {
        if delimiters.contains(c) {
            current.push(c);
            at_boundary = true;
        } else {
            if at_boundary {
                flush(&mut sentences, &mut current);
                at_boundary = false;
            }
            current.push(c);
        }
    }
    flush(&mut sentences, &mut current);
    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if trimmed.chars().any(char::is_alphanumeric) {
        sentences.push(trimmed.to_owned());
    }
    current.clear();
}
