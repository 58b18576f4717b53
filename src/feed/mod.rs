mod fetch;
mod parse;

pub use fetch::fetch_feed_bytes;
pub use parse::{FeedItem, parse_duration, parse_feed, parse_pub_date, pub_time_or_now};
