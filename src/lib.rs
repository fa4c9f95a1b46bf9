//! Headless RSS reader that fetches feeds, extracts article text,
//! summarizes it with a hosted model (or a local extractive fallback),
//! and renders a category-grouped daily digest.

pub mod config;
pub mod content;
pub mod feed;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod summarize;
pub mod util;
