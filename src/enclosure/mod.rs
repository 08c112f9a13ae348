mod download;
mod filename;
mod filter;

pub use download::{FetchResult, fetch_enclosure, resume_offset};
pub use filename::{expand_pattern, guess_filename_from_url, resolve_filename, sanitize_filename};
pub use filter::EnclosureFilter;
