//! Minimal HTML-to-text conversion for the raw-page fallback path.
//!
//! Not a real HTML parser: a single pass that drops tags, skips
//! script/style/noscript bodies, decodes the common entities, and
//! collapses whitespace. Good enough to judge whether a page has
//! article-sized text and to feed a summarizer.

/// Elements whose text content is never article text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "svg", "template"];

/// Block-level elements that imply a paragraph break in the output.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "li", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "section", "article",
    "blockquote",
];

pub fn extract_text_from_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 4);
    let mut rest = html;
    let mut skipping: Option<&str> = None;

    while let Some(lt) = rest.find('<') {
        let (text, after) = rest.split_at(lt);
        if skipping.is_none() {
            push_text(&mut out, text);
        }

        // Comments don't follow tag syntax; skip to the closing marker.
        if after.starts_with("<!--") {
            match after.find("-->") {
                Some(end) => {
                    rest = &after[end + 3..];
                    continue;
                }
                None => {
                    // Unterminated comment swallows the rest of the input
                    rest = "";
                    break;
                }
            }
        }

        let Some(gt) = after.find('>') else {
            // Unterminated tag; drop it and stop
            rest = "";
            break;
        };
        let tag_body = &after[1..gt];
        rest = &after[gt + 1..];

        let (closing, name_part) = match tag_body.strip_prefix('/') {
            Some(stripped) => (true, stripped),
            None => (false, tag_body),
        };
        let name: String = name_part
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match skipping {
            Some(skip) => {
                if closing && name == skip {
                    skipping = None;
                }
            }
            None => {
                if !closing && SKIPPED_ELEMENTS.contains(&name.as_str()) {
                    skipping = Some(
                        SKIPPED_ELEMENTS
                            .iter()
                            .find(|e| **e == name)
                            .copied()
                            .unwrap_or("script"),
                    );
                } else if BLOCK_ELEMENTS.contains(&name.as_str()) {
                    paragraph_break(&mut out);
                }
            }
        }
    }

    if skipping.is_none() {
        push_text(&mut out, rest);
    }

    out.trim().to_string()
}

/// Appends `text` with entities decoded and runs of whitespace collapsed.
fn push_text(out: &mut String, text: &str) {
    let decoded = decode_entities(text);
    for (i, word) in decoded.split_whitespace().enumerate() {
        if i > 0 || needs_space(out) {
            out.push(' ');
        }
        out.push_str(word);
    }
}

fn needs_space(out: &str) -> bool {
    out.chars().next_back().is_some_and(|c| c != '\n' && c != ' ')
}

fn paragraph_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
