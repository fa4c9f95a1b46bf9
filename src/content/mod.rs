//! Full-article text extraction.
//!
//! Primary path is a jina.ai-style reader service (`GET {base}/{url}`
//! returns cleaned article text). When the reader fails outright we fall
//! back to fetching the raw page and stripping tags locally. Either way,
//! results under [`MIN_CONTENT_LEN`] are treated as "no content" so the
//! pipeline can fall back to the feed-provided summary.
//!
//! Article URLs are validated by the caller (the pipeline runs
//! `validate_url` before extraction); this module does not re-check them.

mod html;
mod reader;

pub use html::extract_text_from_html;
pub use reader::fetch_reader_content;

use secrecy::SecretString;
use thiserror::Error;

/// Minimum extracted length (bytes) to count as real article content.
pub const MIN_CONTENT_LEN: usize = 200;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
}

impl ContentError {
    /// True if the request may succeed on retry.
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            ContentError::ResponseTooLarge(_) | ContentError::InvalidUtf8 => false,
        }
    }
}

/// Article text extractor; cheap to clone (the client is an Arc inside).
#[derive(Clone)]
pub struct Extractor {
    client: reqwest::Client,
    reader_base_url: String,
    api_key: Option<SecretString>,
}

impl Extractor {
    pub fn new(
        client: reqwest::Client,
        reader_base_url: String,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            reader_base_url,
            api_key,
        }
    }

    /// Extracts article text for `url`.
    ///
    /// Tries the reader service first; if it errors or returns next to
    /// nothing, falls back to a raw page fetch with local tag stripping.
    /// Returns `Ok(None)` when both paths produce less than
    /// [`MIN_CONTENT_LEN`] bytes.
    pub async fn extract(&self, url: &str) -> Result<Option<String>, ContentError> {
        match fetch_reader_content(
            &self.client,
            url,
            &self.reader_base_url,
            self.api_key.as_ref(),
        )
        .await
        {
            Ok(content) if content.len() >= MIN_CONTENT_LEN => return Ok(Some(content)),
            Ok(content) => {
                tracing::debug!(
                    url = %url,
                    content_len = content.len(),
                    "Reader returned minimal content, trying raw fetch"
                );
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Reader extraction failed, trying raw fetch");
            }
        }

        let text = self.extract_from_raw_page(url).await?;
        if text.len() >= MIN_CONTENT_LEN {
            Ok(Some(text))
        } else {
            Ok(None)
        }
    }

    async fn extract_from_raw_page(&self, url: &str) -> Result<String, ContentError> {
        let response = tokio::time::timeout(
            std::time::Duration::from_secs(20),
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| ContentError::Timeout)?
        .map_err(ContentError::Network)?;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        let body = reader::read_limited_text(response, reader::MAX_CONTENT_SIZE).await?;
        Ok(extract_text_from_html(&body))
    }
}
