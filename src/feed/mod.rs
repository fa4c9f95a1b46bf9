mod fetcher;
mod opml;
mod parser;
mod subscriptions;

pub use fetcher::{refresh_all, FetchError, FetchOptions, FetchResult};
pub use opml::{export_json, export_opml, export_to_file, parse_opml_content, OpmlError};
pub use parser::{parse_feed, ParsedEntry};
pub use subscriptions::{load_subscriptions, FeedStatistics, FeedSubscription};
