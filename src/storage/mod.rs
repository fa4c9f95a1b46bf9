mod articles;
mod digests;
mod feeds;
mod schema;
mod types;

pub use schema::Database;
pub use types::{Article, ArticleWithFeed, DatabaseError, Digest, Feed, NewArticle};
