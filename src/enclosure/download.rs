// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::SeekFrom;
use std::path::Path;

use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::DownloadError;
use crate::feed::{is_url, local_path};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};

const LOCAL_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a successful enclosure transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchResult {
    /// Bytes written to the destination in this transfer
    pub bytes_written: u64,
    /// Offset the transfer actually started at
    pub started_at: u64,
}

/// Decide where a transfer to `destination` starts.
///
/// When resuming, the offset is the size of what is already on disk (zero if
/// nothing is). Without resume an existing destination is a conflict and no
/// transfer may be attempted.
pub fn resume_offset(destination: &Path, resume: bool) -> Result<u64, DownloadError> {
    match std::fs::metadata(destination) {
        Ok(metadata) if resume => Ok(metadata.len()),
        Ok(_) => Err(DownloadError::DestinationExists(destination.to_path_buf())),
        Err(_) => Ok(0),
    }
}

/// Transfer an enclosure into `destination`, starting at `offset`.
///
/// Network URLs are streamed through the HTTP client with a range request
/// when `offset` is non-zero. Anything else is read as a local file. The
/// destination is only opened once the server has accepted the request, so a
/// refused transfer leaves no empty file behind.
pub async fn fetch_enclosure<C: HttpClient>(
    client: &C,
    url: &str,
    destination: &Path,
    offset: u64,
    reporter: &SharedProgressReporter,
) -> Result<FetchResult, DownloadError> {
    if !is_url(url) {
        return copy_local_enclosure(url, destination, offset, reporter).await;
    }

    tracing::debug!(url, offset, destination = %destination.display(), "requesting enclosure");

    let response = client
        .get_stream(url, offset)
        .await
        .map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    tracing::debug!(url, status = response.status, content_length = ?response.content_length, "enclosure response");

    let start = match response.status {
        416 if offset > 0 => {
            tracing::info!(url, offset, "range not satisfiable, treating enclosure as complete");
            return Ok(FetchResult {
                bytes_written: 0,
                started_at: offset,
            });
        }
        status if status >= 400 => {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        200 if offset > 0 => {
            tracing::warn!(url, offset, "server ignored range request, restarting from the beginning");
            0
        }
        _ => offset,
    };

    let mut sink = Sink::open(
        url,
        destination,
        start,
        response.content_length.map(|len| len + start),
        reporter,
    )
    .await?;

    let mut stream = response.body;
    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| DownloadError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;
        sink.write(&chunk).await?;
    }

    sink.finish().await
}

async fn copy_local_enclosure(
    url: &str,
    destination: &Path,
    offset: u64,
    reporter: &SharedProgressReporter,
) -> Result<FetchResult, DownloadError> {
    let source_path = local_path(url);
    let read_err = |e| DownloadError::LocalReadFailed {
        path: source_path.clone(),
        source: e,
    };

    let mut source = File::open(&source_path).await.map_err(read_err)?;
    let total = source.metadata().await.map_err(read_err)?.len();
    if offset > 0 {
        source.seek(SeekFrom::Start(offset)).await.map_err(read_err)?;
    }

    let mut sink = Sink::open(url, destination, offset, Some(total), reporter).await?;
    let mut buffer = vec![0u8; LOCAL_CHUNK_SIZE];
    loop {
        let read = source.read(&mut buffer).await.map_err(read_err)?;
        if read == 0 {
            break;
        }
        sink.write(&buffer[..read]).await?;
    }

    sink.finish().await
}

/// Destination file plus the progress bookkeeping of one transfer
struct Sink<'a> {
    file: File,
    url: &'a str,
    destination: &'a Path,
    start: u64,
    total: Option<u64>,
    written: u64,
    reporter: &'a SharedProgressReporter,
}

impl<'a> Sink<'a> {
    async fn open(
        url: &'a str,
        destination: &'a Path,
        start: u64,
        total: Option<u64>,
        reporter: &'a SharedProgressReporter,
    ) -> Result<Self, DownloadError> {
        let mut options = OpenOptions::new();
        if start > 0 {
            options.append(true).create(true);
        } else {
            options.write(true).create(true).truncate(true);
        }

        let file = options
            .open(destination)
            .await
            .map_err(|e| DownloadError::FileOpenFailed {
                path: destination.to_path_buf(),
                source: e,
            })?;

        Ok(Self {
            file,
            url,
            destination,
            start,
            total,
            written: 0,
            reporter,
        })
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: self.destination.to_path_buf(),
                source: e,
            })?;

        self.written += chunk.len() as u64;
        self.reporter.report(ProgressEvent::DownloadProgress {
            url: self.url.to_string(),
            bytes_downloaded: self.start + self.written,
            total_bytes: self.total,
        });

        Ok(())
    }

    async fn finish(mut self) -> Result<FetchResult, DownloadError> {
        self.file
            .flush()
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: self.destination.to_path_buf(),
                source: e,
            })?;

        Ok(FetchResult {
            bytes_written: self.written,
            started_at: self.start,
        })
    }
}
