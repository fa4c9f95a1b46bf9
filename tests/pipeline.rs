//! End-to-end pipeline tests with mocked feed, reader, and model servers.

use chrono::Utc;
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use newsbrief::config::Config;
use newsbrief::feed::FeedSubscription;
use newsbrief::pipeline::Pipeline;
use newsbrief::storage::Database;

fn rss_feed(article_url: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Tech Blog</title>
    <item>
        <guid>post-1</guid>
        <title>Big Release</title>
        <link>{}</link>
        <description>Short feed blurb</description>
        <pubDate>{}</pubDate>
    </item>
</channel></rss>"#,
        article_url,
        Utc::now().to_rfc2822()
    )
}

fn article_body() -> String {
    "The release ships many changes. ".repeat(20)
}

struct TestSetup {
    db: Database,
    pipeline: Pipeline,
    _config_dir: tempfile::TempDir,
    digest_dir: std::path::PathBuf,
}

fn test_config(reader: &MockServer, llm: &MockServer) -> Config {
    let mut config = Config::default();
    config.reader_base_url = reader.uri();
    config.summarizer.api_base_url = format!("{}/v1/chat/completions", llm.uri());
    config.summarizer.api_key = Some("test-key".into());
    config
}

async fn setup(feed: &MockServer, reader: &MockServer, llm: &MockServer) -> TestSetup {
    setup_with(feed, test_config(reader, llm)).await
}

async fn setup_with(feed: &MockServer, config: Config) -> TestSetup {
    let db = Database::open(":memory:").await.unwrap();
    db.sync_feeds(&[FeedSubscription {
        title: "Tech Blog".into(),
        url: format!("{}/feed.xml", feed.uri()),
        html_url: None,
        category: "technology".into(),
        description: None,
    }])
    .await
    .unwrap();

    let config_dir = tempfile::tempdir().unwrap();
    let digest_dir = config_dir.path().join("digests");
    let pipeline = Pipeline::new(&config, config_dir.path(), db.clone()).unwrap();

    TestSetup {
        db,
        pipeline,
        _config_dir: config_dir,
        digest_dir,
    }
}

#[tokio::test]
async fn full_run_summarizes_and_writes_digest() {
    let feed = MockServer::start().await;
    let reader = MockServer::start().await;
    let llm = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(rss_feed("https://example.com/release")),
        )
        .mount(&feed)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("example.com/release"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body()))
        .mount(&reader)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "A model-written summary of the release."}}]
        })))
        .mount(&llm)
        .await;

    let setup = setup(&feed, &reader, &llm).await;
    let report = setup.pipeline.run_once().await.unwrap();

    assert_eq!(report.feeds_refreshed, 1);
    assert_eq!(report.feeds_failed, 0);
    assert_eq!(report.new_articles, 1);
    assert_eq!(report.summarized, 1);
    assert_eq!(report.digest_articles, 1);
    assert_eq!(setup.db.count_unsummarized().await.unwrap(), 0);

    // Digest stored in the database
    let today = Utc::now().date_naive();
    let digest = setup.db.get_digest(today).await.unwrap().unwrap();
    assert!(digest.content.contains("## Technology"));
    assert!(digest.content.contains("**Big Release**"));
    assert!(digest.content.contains("A model-written summary of the release."));

    // And written to disk
    let path = setup
        .digest_dir
        .join(format!("digest_{}.md", today.format("%Y-%m-%d")));
    let on_disk = std::fs::read_to_string(path).unwrap();
    assert_eq!(on_disk, digest.content);
}

#[tokio::test]
async fn model_failure_degrades_to_extractive_summary() {
    let feed = MockServer::start().await;
    let reader = MockServer::start().await;
    let llm = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(rss_feed("https://example.com/release")),
        )
        .mount(&feed)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body()))
        .mount(&reader)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Invalid API key"}
        })))
        .mount(&llm)
        .await;

    let setup = setup(&feed, &reader, &llm).await;
    let report = setup.pipeline.run_once().await.unwrap();

    // The article still gets a summary, just not a hosted one
    assert_eq!(report.summarized, 1);
    assert_eq!(setup.db.count_unsummarized().await.unwrap(), 0);

    let digest = setup
        .db
        .get_digest(Utc::now().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!(digest.content.contains("The release ships many changes"));
}

#[tokio::test]
async fn feed_failure_is_isolated_and_recorded() {
    let feed = MockServer::start().await;
    let reader = MockServer::start().await;
    let llm = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&feed)
        .await;

    let setup = setup(&feed, &reader, &llm).await;
    let report = setup.pipeline.run_once().await.unwrap();

    assert_eq!(report.feeds_refreshed, 1);
    assert_eq!(report.feeds_failed, 1);
    assert_eq!(report.new_articles, 0);

    let feeds = setup.db.list_feeds().await.unwrap();
    assert!(feeds[0].error.is_some());
    assert_eq!(feeds[0].consecutive_failures, 1);

    // An empty digest is still produced for the day
    let digest = setup
        .db
        .get_digest(Utc::now().date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!(digest.content.contains("No articles found for today."));
}

#[tokio::test]
async fn summarizer_timeout_does_not_cap_feed_fetches() {
    let feed = MockServer::start().await;
    let reader = MockServer::start().await;
    let llm = MockServer::start().await;

    // Feed responds slower than the summarizer timeout but well within
    // the fetcher's own 30s budget.
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(2))
                .set_body_string(rss_feed("https://example.com/release")),
        )
        .mount(&feed)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body()))
        .mount(&reader)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "Summary."}}]
        })))
        .mount(&llm)
        .await;

    let mut config = test_config(&reader, &llm);
    config.summarizer.timeout_seconds = 1;

    let setup = setup_with(&feed, config).await;
    let report = setup.pipeline.run_once().await.unwrap();

    assert_eq!(report.feeds_failed, 0);
    assert_eq!(report.new_articles, 1);
    assert_eq!(report.summarized, 1);
}

#[tokio::test]
async fn second_run_adds_nothing_new() {
    let feed = MockServer::start().await;
    let reader = MockServer::start().await;
    let llm = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(rss_feed("https://example.com/release")),
        )
        .mount(&feed)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(article_body()))
        .mount(&reader)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": "Summary."}}]
        })))
        .mount(&llm)
        .await;

    let setup = setup(&feed, &reader, &llm).await;

    let first = setup.pipeline.run_once().await.unwrap();
    assert_eq!(first.new_articles, 1);

    let second = setup.pipeline.run_once().await.unwrap();
    assert_eq!(second.new_articles, 0);
    assert_eq!(second.summarized, 0);
    assert_eq!(setup.db.count_articles().await.unwrap(), 1);
}
