//! Extractive fallback: no model, just the first, middle, and last
//! sentences of the article.

/// Picks `num_sentences` representative sentences from `content`.
///
/// Short texts (fewer sentences than requested) come back unchanged.
pub fn extract_key_sentences(content: &str, num_sentences: usize) -> String {
    let sentences: Vec<&str> = content
        .split(". ")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.len() <= num_sentences {
        return content.trim().to_string();
    }

    let picks = [
        sentences[0],
        sentences[sentences.len() / 2],
        sentences[sentences.len() - 1],
    ];

    let mut out = picks.join(". ");
    if !out.ends_with('.') {
        out.push('.');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_unchanged() {
        let text = "One sentence. Two sentences.";
        assert_eq!(extract_key_sentences(text, 3), text);
    }

    #[test]
    fn picks_first_middle_last() {
        let text = "Alpha start. Beta filler. Gamma middle. Delta filler. Epsilon end.";
        let summary = extract_key_sentences(text, 3);
        assert!(summary.starts_with("Alpha start"));
        assert!(summary.contains("Gamma middle"));
        assert!(summary.ends_with("Epsilon end."));
        assert!(!summary.contains("Beta filler"));
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(extract_key_sentences("", 3), "");
    }
}
