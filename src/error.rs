// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or resolving the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration of channel {identifier}: {source}")]
    InvalidSection {
        identifier: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown channel identifier {0}")]
    UnknownChannel(String),

    #[error("No feed URL set for channel {0}")]
    MissingUrl(String),

    #[error("No spool directory set for channel {0}")]
    MissingSpoolDirectory(String),

    #[error("Invalid filter expression '{pattern}': {source}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that can occur when fetching or parsing RSS feeds
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch feed from {url}: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} while fetching feed from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to read feed file {path}: {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unrecognized top-level element in feed")]
    UnrecognizedRoot,

    #[error("Failed to parse RSS feed: {0}")]
    ParseFailed(#[from] rss::Error),
}

/// Errors that can occur while transferring an enclosure
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read local enclosure {path}: {source}")]
    LocalReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Spool directory {0} not found")]
    SpoolDirectoryMissing(PathBuf),

    #[error("Destination file {0} already exists; use resume to continue it")]
    DestinationExists(PathBuf),

    #[error("Failed to open file {path}: {source}")]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when loading or saving a channel-state file
#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to read channel file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error parsing channel file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Error parsing channel file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Error creating temporary file next to {path}: {source}")]
    TempFileFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error writing channel file {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error renaming temporary file to {path}: {source}")]
    RenameFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when appending to a playlist
#[derive(Error, Debug)]
pub enum PlaylistError {
    #[error("Failed to update playlist {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level errors for a single channel run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Error downloading enclosure from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: DownloadError,
    },
}
