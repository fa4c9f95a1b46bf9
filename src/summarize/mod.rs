//! Article summarization: hosted chat-completion model with a local
//! extractive fallback, plus daily digest rendering.

mod digest;
mod extractive;
mod provider;

pub use digest::{render_digest, DigestArticle};
pub use extractive::extract_key_sentences;
pub use provider::{ChatProvider, ProviderError};

/// Articles shorter than this aren't worth summarizing; the pipeline
/// keeps the feed-provided summary instead.
pub const MIN_SUMMARIZABLE_LEN: usize = 100;

/// How the stored summary was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMethod {
    Hosted,
    Extractive,
}

impl SummaryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMethod::Hosted => "hosted",
            SummaryMethod::Extractive => "extractive",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub text: String,
    pub method: SummaryMethod,
}

/// Summarizes article text, preferring the hosted model when configured.
pub struct Summarizer {
    provider: Option<ChatProvider>,
    max_input_chars: usize,
}

impl Summarizer {
    pub fn new(provider: Option<ChatProvider>, max_input_chars: usize) -> Self {
        Self {
            provider,
            max_input_chars,
        }
    }

    /// Summarizes `content`, returning `None` when it is too short to
    /// bother. Falls back to extractive summarization when no provider
    /// is configured or the hosted call fails, so one flaky API never
    /// stalls the pipeline.
    pub async fn summarize(&self, title: &str, content: &str) -> Option<Summary> {
        if content.len() < MIN_SUMMARIZABLE_LEN {
            return None;
        }

        let input = truncate_chars(content, self.max_input_chars);

        if let Some(provider) = &self.provider {
            match provider.summarize_article(title, input).await {
                Ok(text) => {
                    return Some(Summary {
                        text,
                        method: SummaryMethod::Hosted,
                    })
                }
                Err(e) => {
                    tracing::warn!(title = %title, error = %e, "Hosted summarization failed, using extractive fallback");
                }
            }
        }

        Some(Summary {
            text: extract_key_sentences(input, 3),
            method: SummaryMethod::Extractive,
        })
    }
}

/// Truncates to at most `max_chars` characters.
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_content() -> String {
        "First sentence here. ".repeat(20)
    }

    #[tokio::test]
    async fn short_content_skipped() {
        let summarizer = Summarizer::new(None, 12_000);
        assert!(summarizer.summarize("Title", "too short").await.is_none());
    }

    #[tokio::test]
    async fn no_provider_uses_extractive() {
        let summarizer = Summarizer::new(None, 12_000);
        let summary = summarizer
            .summarize("Title", &long_content())
            .await
            .unwrap();
        assert_eq!(summary.method, SummaryMethod::Extractive);
        assert!(!summary.text.is_empty());
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let s = "é".repeat(100); // 2 bytes per char
        let truncated = truncate_chars(&s, 10);
        assert_eq!(truncated.chars().count(), 10);

        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 10), "");
    }
}
