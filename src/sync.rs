// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::date::{format_rfc822, rfc822_now};
use crate::enclosure::{EnclosureFilter, FetchResult, fetch_enclosure, resolve_filename, resume_offset};
use crate::error::{DownloadError, SyncError};
use crate::feed::{Enclosure, FeedVersion, Item, retrieve_feed};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::state::ChannelState;

/// What happens to each eligible enclosure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Download and record
    #[default]
    Update,
    /// Record without downloading
    Catchup,
    /// Only report; nothing is fetched or recorded
    List,
}

/// A fully resolved channel definition
#[derive(Debug, Clone)]
pub struct Channel {
    pub identifier: String,
    /// Feed URL or local path
    pub url: String,
    pub spool_directory: PathBuf,
    pub filename_pattern: Option<String>,
    pub filter: Option<EnclosureFilter>,
    /// Where the channel's state is persisted
    pub state_file: PathBuf,
}

/// Options for a single channel run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub mode: SyncMode,
    /// Continue partial downloads instead of refusing to touch them
    pub resume: bool,
    /// Stop after the first eligible enclosure
    pub first_only: bool,
    /// Walk items in reverse document order
    pub reverse: bool,
    /// Takes precedence over the channel's own filter
    pub filter: Option<EnclosureFilter>,
}

/// An enclosure handled during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedEnclosure {
    pub url: String,
    pub destination: PathBuf,
    /// `None` unless the enclosure was transferred
    pub bytes_written: Option<u64>,
}

/// Result of a channel run
#[derive(Debug, Clone)]
pub struct ChannelReport {
    pub channel_title: Option<String>,
    pub version: FeedVersion,
    /// Fetch time of the feed, formatted as stored in the state file
    pub fetched_at: String,
    pub processed: Vec<ProcessedEnclosure>,
    pub already_downloaded: usize,
    pub filtered_out: usize,
}

/// Synchronize one channel.
///
/// Retrieves the feed, picks the enclosures that are neither recorded nor
/// filtered out and handles them according to `options.mode`. Every recorded
/// enclosure is saved to the state file before the next one is looked at, so
/// an interrupted run loses at most the enclosure in flight.
///
/// A failed download ends the run immediately. Enclosures recorded before
/// the failure stay recorded, and the feed's fetch time is left untouched.
pub async fn sync_channel<C: HttpClient>(
    client: &C,
    channel: &Channel,
    options: &SyncOptions,
    reporter: SharedProgressReporter,
) -> Result<ChannelReport, SyncError> {
    let mut state = ChannelState::load(&channel.state_file)?;

    tracing::debug!(channel = %channel.identifier, source = %channel.url, "fetching feed");
    reporter.report(ProgressEvent::FeedFetchStarted {
        source: channel.url.clone(),
    });

    let snapshot = retrieve_feed(client, &channel.url).await?;
    let fetched_at = format_rfc822(snapshot.fetched_at);

    tracing::debug!(
        channel = %channel.identifier,
        version = %snapshot.version,
        items = snapshot.items.len(),
        "enumerating items"
    );

    let filter = options.filter.as_ref().or(channel.filter.as_ref());
    let selection = select_candidates(&snapshot.items, &state, filter, options.reverse);

    reporter.report(ProgressEvent::FeedFetched {
        channel_title: snapshot.channel.title.clone(),
        version: snapshot.version,
        total_items: snapshot.items.len(),
        candidates: selection.candidates.len(),
    });

    let mut processed = Vec::new();
    for (index, (item, enclosure)) in selection.candidates.into_iter().enumerate() {
        let destination = resolve_filename(
            &channel.spool_directory,
            channel.filename_pattern.as_deref(),
            &snapshot.channel,
            item,
        );

        tracing::debug!(
            channel = %channel.identifier,
            url = %enclosure.url,
            destination = %destination.display(),
            mode = ?options.mode,
            "processing item"
        );
        reporter.report(ProgressEvent::EnclosureStarted {
            mode: options.mode,
            url: enclosure.url.clone(),
            length: enclosure.length,
            destination: destination.clone(),
            index,
        });

        let bytes_written = match options.mode {
            SyncMode::Update => {
                match download(client, channel, enclosure, &destination, options.resume, &reporter)
                    .await
                {
                    Ok(result) => Some(result.bytes_written),
                    Err(e) => {
                        reporter.report(ProgressEvent::EnclosureFailed {
                            url: enclosure.url.clone(),
                            error: e.to_string(),
                        });
                        return Err(SyncError::Download {
                            url: enclosure.url.clone(),
                            source: e,
                        });
                    }
                }
            }
            SyncMode::Catchup | SyncMode::List => None,
        };

        if options.mode != SyncMode::List {
            state.mark_downloaded(&enclosure.url, rfc822_now());
            state.save(&channel.state_file)?;
        }

        reporter.report(ProgressEvent::EnclosureCompleted {
            mode: options.mode,
            url: enclosure.url.clone(),
            destination: destination.clone(),
            bytes_written,
        });
        processed.push(ProcessedEnclosure {
            url: enclosure.url.clone(),
            destination,
            bytes_written,
        });

        if options.first_only {
            break;
        }
    }

    if options.mode != SyncMode::List {
        tracing::debug!(channel = %channel.identifier, last_fetched = %fetched_at, "finalizing");
        state.last_fetched = Some(fetched_at.clone());
        state.save(&channel.state_file)?;
    }

    reporter.report(ProgressEvent::ChannelCompleted {
        processed: processed.len(),
        already_downloaded: selection.already_downloaded,
        filtered_out: selection.filtered_out,
    });

    Ok(ChannelReport {
        channel_title: snapshot.channel.title,
        version: snapshot.version,
        fetched_at,
        processed,
        already_downloaded: selection.already_downloaded,
        filtered_out: selection.filtered_out,
    })
}

struct Selection<'a> {
    candidates: Vec<(&'a Item, &'a Enclosure)>,
    already_downloaded: usize,
    filtered_out: usize,
}

/// Walk the items and keep enclosures that still need handling.
///
/// An enclosure listed twice in the same feed is only considered once.
fn select_candidates<'a>(
    items: &'a [Item],
    state: &ChannelState,
    filter: Option<&EnclosureFilter>,
    reverse: bool,
) -> Selection<'a> {
    let ordered: Box<dyn Iterator<Item = &'a Item>> = if reverse {
        Box::new(items.iter().rev())
    } else {
        Box::new(items.iter())
    };

    let mut selection = Selection {
        candidates: Vec::new(),
        already_downloaded: 0,
        filtered_out: 0,
    };
    let mut seen = HashSet::new();

    for item in ordered {
        let Some(enclosure) = item.enclosure.as_ref() else {
            continue;
        };
        if !seen.insert(enclosure.url.as_str()) {
            continue;
        }

        if state.is_downloaded(&enclosure.url) {
            selection.already_downloaded += 1;
        } else if filter.is_some_and(|filter| !filter.matches(&enclosure.url)) {
            selection.filtered_out += 1;
        } else {
            selection.candidates.push((item, enclosure));
        }
    }

    selection
}

async fn download<C: HttpClient>(
    client: &C,
    channel: &Channel,
    enclosure: &Enclosure,
    destination: &Path,
    resume: bool,
    reporter: &SharedProgressReporter,
) -> Result<FetchResult, DownloadError> {
    if !channel.spool_directory.is_dir() {
        return Err(DownloadError::SpoolDirectoryMissing(
            channel.spool_directory.clone(),
        ));
    }

    let offset = resume_offset(destination, resume)?;
    fetch_enclosure(client, &enclosure.url, destination, offset, reporter).await
}
