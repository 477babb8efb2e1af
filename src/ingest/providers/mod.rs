pub mod feed_rss;
pub mod reddit;
