mod entities;
mod fetch;
mod parse;

pub use entities::{html_entity_code_point, rewrite_html_entities};
pub use fetch::{fetch_feed_bytes, is_url, local_path, read_feed_file, retrieve_feed};
pub use parse::{ChannelInfo, Enclosure, FeedSnapshot, FeedVersion, Item, parse_feed};
