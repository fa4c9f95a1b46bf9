//! Reader-service client (jina.ai style: `GET {base}/{article_url}`
//! returns the page as cleaned Markdown/plain text).

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{ContentError, MIN_CONTENT_LEN};
use futures::StreamExt;

/// Hard cap on extracted article size.
pub(crate) const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// CSS selectors targeting main article content across common blog
/// platforms. Order matters: specific selectors first, generic last.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// Fetches cleaned article text for `url` through the reader service at
/// `base`.
///
/// First attempt sends `X-Target-Selector` for tighter extraction; if
/// that yields less than [`MIN_CONTENT_LEN`] bytes the request is
/// repeated without the selector (some sites don't use standard article
/// containers). The API key is only attached on HTTPS bases so it can't
/// leak over plaintext.
pub async fn fetch_reader_content(
    client: &reqwest::Client,
    url: &str,
    base: &str,
    api_key: Option<&SecretString>,
) -> Result<String, ContentError> {
    let reader_url = format!("{}/{}", base.trim_end_matches('/'), url);
    let key = if base.starts_with("https://") {
        api_key
    } else {
        None
    };

    let content = fetch_with_retry(client, &reader_url, true, key).await?;
    if content.len() < MIN_CONTENT_LEN {
        tracing::debug!(
            content_len = content.len(),
            "Target selector returned minimal content, retrying without selector"
        );
        let content = fetch_with_retry(client, &reader_url, false, key).await?;
        return Ok(strip_boilerplate(&content));
    }

    Ok(strip_boilerplate(&content))
}

/// Retries transient failures with exponential backoff: 1s, 2s, 4s.
async fn fetch_with_retry(
    client: &reqwest::Client,
    reader_url: &str,
    use_selector: bool,
    api_key: Option<&SecretString>,
) -> Result<String, ContentError> {
    const MAX_RETRIES: u32 = 3;
    let mut retry_count = 0;

    loop {
        match fetch_once(client, reader_url, use_selector, api_key).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                let delay = 1u64 << retry_count;
                tracing::debug!(
                    error = %e,
                    retry = retry_count + 1,
                    delay_secs = delay,
                    "Retrying reader fetch after transient error"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    reader_url: &str,
    use_selector: bool,
    api_key: Option<&SecretString>,
) -> Result<String, ContentError> {
    let mut request = client.get(reader_url);

    if use_selector {
        request = request.header("X-Target-Selector", TARGET_SELECTORS);
    }
    if let Some(key) = api_key {
        request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
    }

    let response = tokio::time::timeout(Duration::from_secs(20), request.send())
        .await
        .map_err(|_| ContentError::Timeout)?
        .map_err(ContentError::Network)?;

    if !response.status().is_success() {
        return Err(ContentError::HttpStatus(response.status().as_u16()));
    }

    read_limited_text(response, MAX_CONTENT_SIZE).await
}

/// Reads a response body up to `limit` bytes, erroring past the cap.
pub(crate) async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}

/// Strips common reader-output cruft: skip-links, comment scaffolding,
/// WordPress footers, and long runs of monthly archive links.
fn strip_boilerplate(content: &str) -> String {
    let lines: Vec<&str> = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.starts_with("[Skip to content]")
                || trimmed == "Loading Comments..."
                || trimmed == "Write a Comment..."
                || trimmed.starts_with("Email (Required)")
                || trimmed == "Menu"
                || trimmed.contains("Proudly powered by WordPress"))
        })
        .collect();

    // Drop runs of 3+ consecutive "*   [Month Year](url)" archive links.
    let mut result: Vec<&str> = Vec::with_capacity(lines.len());
    let mut run_start = None;
    let mut run_len = 0;

    for line in lines {
        if is_archive_link(line) {
            if run_start.is_none() {
                run_start = Some(result.len());
            }
            run_len += 1;
            result.push(line);
        } else {
            if run_len >= 3 {
                if let Some(start) = run_start {
                    result.truncate(start);
                }
            }
            run_start = None;
            run_len = 0;
            result.push(line);
        }
    }
    if run_len >= 3 {
        if let Some(start) = run_start {
            result.truncate(start);
        }
    }

    result.join("\n")
}

const MONTH_PATTERNS: &[&str] = &[
    "[January",
    "[February",
    "[March",
    "[April",
    "[May",
    "[June",
    "[July",
    "[August",
    "[September",
    "[October",
    "[November",
    "[December",
];

fn is_archive_link(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('*') {
        return false;
    }

    MONTH_PATTERNS.iter().any(|pattern| {
        trimmed.find(pattern).is_some_and(|idx| {
            let after = &trimmed[idx + pattern.len()..];
            after
                .get(1..5)
                .is_some_and(|year| year.chars().all(|c| c.is_ascii_digit()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_exists, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body(len: usize) -> String {
        "x".repeat(len)
    }

    #[tokio::test]
    async fn fetches_through_reader_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("example.com/article"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(500)))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let content = fetch_reader_content(
            &client,
            "https://example.com/article",
            &server.uri(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(content.len(), 500);
    }

    #[tokio::test]
    async fn retries_without_selector_when_content_short() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header_exists("X-Target-Selector"))
            .respond_with(ResponseTemplate::new(200).set_body_string("short"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(500)))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let content = fetch_reader_content(
            &client,
            "https://example.com/article",
            &server.uri(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(content.len(), 500);
    }

    #[tokio::test]
    async fn api_key_not_sent_over_plain_http() {
        let server = MockServer::start().await;
        // Fail the test if an Authorization header arrives.
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body(300)))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let key = SecretString::from("secret");
        let content = fetch_reader_content(
            &client,
            "https://example.com/article",
            &server.uri(),
            Some(&key),
        )
        .await
        .unwrap();
        assert_eq!(content.len(), 300);
    }

    #[tokio::test]
    async fn http_404_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_reader_content(&client, "https://example.com/a", &server.uri(), None).await;
        assert!(matches!(result, Err(ContentError::HttpStatus(404))));
    }

    #[tokio::test]
    async fn oversized_response_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Length", (MAX_CONTENT_SIZE + 1).to_string().as_str())
                    .set_body_bytes(vec![b'x'; 1024]),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_reader_content(&client, "https://example.com/a", &server.uri(), None).await;
        assert!(matches!(result, Err(ContentError::ResponseTooLarge(_))));
    }

    #[test]
    fn strips_skip_link_and_footer() {
        let input = "[Skip to content](https://example.com/#content)\n# Title\nBody.\nProudly powered by WordPress";
        let result = strip_boilerplate(input);
        assert!(!result.contains("Skip to content"));
        assert!(!result.contains("WordPress"));
        assert!(result.contains("Title"));
        assert!(result.contains("Body."));
    }

    #[test]
    fn strips_long_archive_runs_only() {
        let run = "*   [January 2026](https://e.com/1)\n*   [February 2026](https://e.com/2)\n*   [March 2026](https://e.com/3)";
        let stripped = strip_boilerplate(&format!("Content\n{}", run));
        assert!(!stripped.contains("January 2026"));
        assert!(stripped.contains("Content"));

        let short = "Content\n*   [January 2026](https://e.com/1)\n*   [February 2026](https://e.com/2)";
        assert_eq!(strip_boilerplate(short), short);
    }

    #[test]
    fn archive_link_detection() {
        assert!(is_archive_link("*   [January 2026](https://example.com/)"));
        assert!(is_archive_link("  *   [December 2025](https://example.com/)"));
        assert!(!is_archive_link("*   [Some Article](https://example.com/)"));
        assert!(!is_archive_link("January 2026"));
    }
}
