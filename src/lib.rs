// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod date;
pub mod enclosure;
pub mod error;
pub mod feed;
pub mod http;
pub mod playlist;
pub mod progress;
pub mod state;
pub mod sync;

// Re-export main types for convenience
pub use config::{ChannelConfig, Config, default_channel_dir, default_config_path};
pub use enclosure::{EnclosureFilter, FetchResult, fetch_enclosure, resolve_filename, resume_offset};
pub use error::{ConfigError, DownloadError, FeedError, PlaylistError, StateError, SyncError};
pub use feed::{ChannelInfo, Enclosure, FeedSnapshot, FeedVersion, Item, parse_feed, retrieve_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use playlist::append_to_playlist;
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use state::ChannelState;
pub use sync::{Channel, ChannelReport, ProcessedEnclosure, SyncMode, SyncOptions, sync_channel};
