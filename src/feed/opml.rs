//! OPML subscription-list parsing and export.
//!
//! Feeds are `<outline>` elements carrying an `xmlUrl` attribute. Outlines
//! without one act as folders; a feed inherits its category from the nearest
//! enclosing folder's text, normalized to a lowercase identifier.

use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::feed::subscriptions::FeedSubscription;
use crate::util::validate_url;

/// Maximum allowed nesting depth for OPML outline elements. Prevents
/// stack abuse from maliciously crafted deeply nested files.
const MAX_OPML_DEPTH: usize = 50;

/// Category assigned when no enclosing folder names one.
pub const DEFAULT_CATEGORY: &str = "general";

#[derive(Debug, Error)]
pub enum OpmlError {
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("XML parse error: {0}")]
    XmlParse(String),

    #[error("Failed to read OPML file: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses an OPML file from disk and extracts feed subscriptions.
///
/// Feeds with invalid URLs (localhost, private IPs, non-HTTP schemes)
/// are skipped with a warning log rather than failing the whole file.
///
/// # Security
///
/// - XXE is structurally mitigated: quick-xml (0.37) does not parse
///   `<!ENTITY>` declarations, and `decode_and_unescape_value()` only
///   resolves the five XML builtins.
/// - URLs are validated against localhost and private networks.
pub async fn parse(path: &str) -> Result<Vec<FeedSubscription>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read OPML file: {}", path))?;
    parse_opml_content(&content)
}

/// Parses OPML content, tracking the folder stack so feeds inherit the
/// category of their enclosing outline.
pub fn parse_opml_content(content: &str) -> Result<Vec<FeedSubscription>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut feeds = Vec::new();
    let mut buf = Vec::new();
    // Stack of enclosing folder names; the top is the current category.
    let mut folders: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                if folders.len() >= MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH).into());
                }

                let outline = read_outline(&e, &reader)?;
                let category = current_category(&folders);
                if let Some(feed) = outline.clone().into_subscription(&category) {
                    feeds.push(feed);
                    // A feed outline can still contain children; it does not
                    // rename the category for them.
                    folders.push(category);
                } else {
                    folders.push(normalize_category(outline.title.as_deref().unwrap_or("")));
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                let outline = read_outline(&e, &reader)?;
                let category = current_category(&folders);
                if let Some(feed) = outline.into_subscription(&category) {
                    feeds.push(feed);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                folders.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::XmlParse(e.to_string()).into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(feeds)
}

fn current_category(folders: &[String]) -> String {
    folders
        .iter()
        .rev()
        .find(|c| !c.is_empty() && *c != DEFAULT_CATEGORY)
        .cloned()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

/// Normalizes a folder name into a category identifier: lowercase,
/// punctuation stripped, whitespace collapsed to underscores.
pub fn normalize_category(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut last_was_space = true; // leading whitespace is dropped
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            for lower in ch.to_lowercase() {
                cleaned.push(lower);
            }
            last_was_space = false;
        } else if ch.is_whitespace() && !last_was_space {
            cleaned.push('_');
            last_was_space = true;
        }
        // other punctuation dropped entirely
    }
    let cleaned = cleaned.trim_end_matches('_').to_string();
    if cleaned.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone)]
struct RawOutline {
    xml_url: Option<String>,
    html_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
}

impl RawOutline {
    fn into_subscription(self, category: &str) -> Option<FeedSubscription> {
        let url = self.xml_url?;
        match validate_url(&url) {
            Ok(_) => Some(FeedSubscription {
                title: self.title.unwrap_or_else(|| url.clone()),
                url,
                html_url: self.html_url,
                category: category.to_string(),
                description: self.description,
            }),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Skipping invalid feed URL");
                None
            }
        }
    }
}

fn read_outline(
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<RawOutline> {
    let mut outline = RawOutline {
        xml_url: None,
        html_url: None,
        title: None,
        description: None,
    };

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let decoder = reader.decoder();
        match attr.key.as_ref() {
            b"xmlUrl" => outline.xml_url = Some(attr.decode_and_unescape_value(decoder)?.to_string()),
            b"htmlUrl" => {
                let url_str = attr.decode_and_unescape_value(decoder)?;
                match validate_url(&url_str) {
                    Ok(_) => outline.html_url = Some(url_str.to_string()),
                    Err(e) => {
                        tracing::warn!(url = %url_str, error = %e, "Ignoring invalid htmlUrl in OPML");
                    }
                }
            }
            b"title" => outline.title = Some(attr.decode_and_unescape_value(decoder)?.to_string()),
            b"text" => {
                if outline.title.is_none() {
                    outline.title = Some(attr.decode_and_unescape_value(decoder)?.to_string())
                }
            }
            b"description" => {
                outline.description = Some(attr.decode_and_unescape_value(decoder)?.to_string())
            }
            _ => {}
        }
    }

    Ok(outline)
}

/// Exports subscriptions as an OPML 2.0 document, one folder per category.
pub fn export_opml(feeds: &[FeedSubscription]) -> Result<String> {
    use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
    use quick_xml::Writer;
    use std::io::Cursor;

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .context("Failed to write XML declaration")?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    writer
        .write_event(Event::Start(opml))
        .context("Failed to write opml element")?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .context("Failed to write head element")?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .context("Failed to write title element")?;
    writer
        .write_event(Event::Text(BytesText::new("newsbrief subscriptions")))
        .context("Failed to write title text")?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .context("Failed to write title end")?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .context("Failed to write head end")?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .context("Failed to write body element")?;

    // Stable ordering: categories in first-seen order, feeds in input order.
    let mut categories: Vec<&str> = Vec::new();
    for feed in feeds {
        if !categories.contains(&feed.category.as_str()) {
            categories.push(&feed.category);
        }
    }

    for category in categories {
        let mut folder = BytesStart::new("outline");
        folder.push_attribute(("text", category));
        folder.push_attribute(("title", category));
        writer
            .write_event(Event::Start(folder))
            .context("Failed to write category outline")?;

        for feed in feeds.iter().filter(|f| f.category == category) {
            let mut outline = BytesStart::new("outline");
            outline.push_attribute(("type", "rss"));
            outline.push_attribute(("text", feed.title.as_str()));
            outline.push_attribute(("title", feed.title.as_str()));
            outline.push_attribute(("xmlUrl", feed.url.as_str()));
            if let Some(ref html_url) = feed.html_url {
                outline.push_attribute(("htmlUrl", html_url.as_str()));
            }
            if let Some(ref description) = feed.description {
                outline.push_attribute(("description", description.as_str()));
            }
            writer
                .write_event(Event::Empty(outline))
                .context("Failed to write outline element")?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("outline")))
            .context("Failed to write category outline end")?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .context("Failed to write body end")?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .context("Failed to write opml end")?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).context("Generated OPML contains invalid UTF-8")
}

/// Exports subscriptions in the legacy JSON feed-list format:
/// `{"feeds": [{"url", "category", "title", "description"}]}`.
pub fn export_json(feeds: &[FeedSubscription]) -> Result<String> {
    let entries: Vec<serde_json::Value> = feeds
        .iter()
        .map(|f| {
            serde_json::json!({
                "url": f.url,
                "category": f.category,
                "title": f.title,
                "description": f.description.clone().unwrap_or_default(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({ "feeds": entries }))
        .context("Failed to serialize feed list to JSON")
}

/// Exports subscriptions to an OPML file atomically.
pub fn export_to_file(feeds: &[FeedSubscription], path: &std::path::Path) -> Result<()> {
    let content = export_opml(feeds)?;
    crate::util::atomic_write(path, content.as_bytes())
}
