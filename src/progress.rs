// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

use crate::feed::FeedVersion;
use crate::sync::SyncMode;

/// Events emitted while a channel is synchronized
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The feed is about to be retrieved
    FeedFetchStarted { source: String },

    /// The feed has been retrieved and parsed
    FeedFetched {
        channel_title: Option<String>,
        version: FeedVersion,
        total_items: usize,
        /// Enclosures that are neither downloaded nor filtered out
        candidates: usize,
    },

    /// Work on one enclosure begins
    EnclosureStarted {
        mode: SyncMode,
        url: String,
        /// Size announced by the feed, 0 when unknown
        length: u64,
        destination: PathBuf,
        /// Position in this run's candidate list
        index: usize,
    },

    /// Transfer progress; both values include any resume offset
    DownloadProgress {
        url: String,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },

    /// An enclosure was handled and recorded (or, when listing, just seen)
    EnclosureCompleted {
        mode: SyncMode,
        url: String,
        destination: PathBuf,
        /// Bytes transferred in this run; `None` if nothing was fetched
        bytes_written: Option<u64>,
    },

    /// An enclosure could not be downloaded; the channel run stops here
    EnclosureFailed { url: String, error: String },

    /// The channel run finished
    ChannelCompleted {
        processed: usize,
        already_downloaded: usize,
        filtered_out: usize,
    },
}

/// Receives the events of a channel run.
///
/// The synchronizer never prints; console output and post-processing such
/// as playlist updates live in implementations of this trait.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every event for later inspection
    #[derive(Default)]
    pub struct RecordingReporter {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl RecordingReporter {
        pub fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressReporter for RecordingReporter {
        fn report(&self, event: ProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
