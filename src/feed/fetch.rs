// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use url::Url;

use crate::error::FeedError;
use crate::http::HttpClient;

use super::parse::{FeedSnapshot, parse_feed};

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    let (status, bytes) = client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })?;

    if status >= 400 {
        return Err(FeedError::HttpStatus {
            url: url.to_string(),
            status,
        });
    }

    Ok(bytes)
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Retrieve and parse a feed from a URL or local file.
///
/// The snapshot's fetch time is taken right after the bytes arrive, so it
/// reflects the feed's age rather than when processing finished.
pub async fn retrieve_feed<C: HttpClient>(
    client: &C,
    source: &str,
) -> Result<FeedSnapshot, FeedError> {
    let bytes = if is_url(source) {
        fetch_feed_bytes(client, source).await?.to_vec()
    } else {
        read_feed_file(&local_path(source))?
    };

    let fetched_at = Utc::now();
    parse_feed(&bytes, fetched_at)
}

/// Determine if a string is a network URL rather than a local source
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Turn a non-network source into a filesystem path, accepting `file://` URLs
pub fn local_path(source: &str) -> PathBuf {
    Url::parse(source)
        .ok()
        .filter(|url| url.scheme() == "file")
        .and_then(|url| url.to_file_path().ok())
        .unwrap_or_else(|| PathBuf::from(source))
}
