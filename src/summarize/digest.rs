//! Daily digest rendering: Markdown grouped by category.

use chrono::NaiveDate;
use std::collections::BTreeMap;

/// One article as it appears in a digest.
#[derive(Debug, Clone)]
pub struct DigestArticle {
    pub title: String,
    pub url: Option<String>,
    /// Normalized category of the owning feed.
    pub category: String,
    pub feed_title: String,
    pub summary: String,
}

/// Renders the digest for `date` as Markdown.
///
/// Articles are grouped under `## Category` headings, sorted by
/// category name. An empty day still produces a document so the
/// `digest` command has something to show.
pub fn render_digest(date: NaiveDate, articles: &[DigestArticle]) -> String {
    let mut out = format!(
        "# Daily News Digest - {}\n\n{} articles\n\n",
        date.format("%Y-%m-%d"),
        articles.len()
    );

    if articles.is_empty() {
        out.push_str("No articles found for today.\n");
        return out;
    }

    let mut by_category: BTreeMap<&str, Vec<&DigestArticle>> = BTreeMap::new();
    for article in articles {
        by_category
            .entry(article.category.as_str())
            .or_default()
            .push(article);
    }

    for (category, items) in by_category {
        out.push_str(&format!("## {}\n\n", title_case(category)));
        for article in items {
            out.push_str(&format!("**{}**\n\n", article.title));
            out.push_str(&format!("{}\n\n", article.summary.trim()));
            match &article.url {
                Some(url) => out.push_str(&format!(
                    "Source: {} ([link]({}))\n\n",
                    article.feed_title, url
                )),
                None => out.push_str(&format!("Source: {}\n\n", article.feed_title)),
            }
        }
    }

    out
}

/// Turns a normalized category id back into a heading: `machine_learning`
/// becomes `Machine Learning`.
fn title_case(category: &str) -> String {
    category
        .split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, category: &str) -> DigestArticle {
        DigestArticle {
            title: title.to_string(),
            url: Some(format!("https://example.com/{}", title)),
            category: category.to_string(),
            feed_title: "Example Feed".to_string(),
            summary: format!("Summary of {}.", title),
        }
    }

    #[test]
    fn empty_day_renders_placeholder() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        let digest = render_digest(date, &[]);
        assert!(digest.contains("Daily News Digest - 2026-08-27"));
        assert!(digest.contains("No articles found for today."));
    }

    #[test]
    fn groups_by_category_sorted() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 27).unwrap();
        let articles = vec![
            article("one", "technology"),
            article("two", "news"),
            article("three", "technology"),
        ];

        let digest = render_digest(date, &articles);
        assert!(digest.contains("3 articles"));
        let news_pos = digest.find("## News").unwrap();
        let tech_pos = digest.find("## Technology").unwrap();
        assert!(news_pos < tech_pos);
        assert!(digest.contains("**one**"));
        assert!(digest.contains("Source: Example Feed"));
        assert!(digest.contains("[link](https://example.com/one)"));
    }

    #[test]
    fn multi_word_categories_title_cased() {
        assert_eq!(title_case("machine_learning"), "Machine Learning");
        assert_eq!(title_case("general"), "General");
    }
}
