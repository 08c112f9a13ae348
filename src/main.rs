// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podspool::{
    Config, EnclosureFilter, ProgressEvent, ProgressReporter, ReqwestClient, SyncMode,
    SyncOptions, append_to_playlist, default_channel_dir, default_config_path, sync_channel,
};

// Emoji with fallback for terminals without Unicode support
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static CATCHUP: Emoji<'_, '_> = Emoji("⏭️  ", "[>] ");
static LISTED: Emoji<'_, '_> = Emoji("📄 ", "[-] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");

/// Download RSS enclosures from the channels in your configuration
#[derive(Parser, Debug)]
#[command(name = "podspool")]
#[command(about = "Download RSS enclosures (podcasts) from configured channels")]
#[command(version)]
struct Args {
    /// Channel identifiers to process (default: every configured channel)
    channels: Vec<String>,

    /// Mark all current enclosures as downloaded without fetching them
    #[arg(short, long, conflicts_with = "list")]
    catchup: bool,

    /// List enclosures that would be downloaded, without changing anything
    #[arg(short, long)]
    list: bool,

    /// Resume interrupted downloads
    #[arg(short, long)]
    resume: bool,

    /// Only process the first eligible enclosure of each channel
    #[arg(short = '1', long)]
    first_only: bool,

    /// Walk channel items in reverse order
    #[arg(long)]
    reverse: bool,

    /// Only handle enclosures whose URL matches this regular expression
    #[arg(short, long, value_name = "REGEX")]
    filter: Option<String>,

    /// Only process channels that have never been synchronized
    #[arg(short, long)]
    new_only: bool,

    /// Configuration file (default: ~/.podspoolrc)
    #[arg(short = 'C', long, value_name = "PATH")]
    rcfile: Option<PathBuf>,

    /// Print debug output
    #[arg(short, long)]
    debug: bool,

    /// Print detailed progress
    #[arg(short, long)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, conflicts_with_all = ["verbose", "progress_bar"])]
    quiet: bool,

    /// Show a progress bar for each download
    #[arg(short, long)]
    progress_bar: bool,
}

impl Args {
    fn mode(&self) -> SyncMode {
        if self.catchup {
            SyncMode::Catchup
        } else if self.list {
            SyncMode::List
        } else {
            SyncMode::Update
        }
    }

    fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

/// Console output for one channel run
struct ConsoleReporter {
    identifier: String,
    verbosity: Verbosity,
    progress_bar: bool,
    playlist: Option<PathBuf>,
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    fn new(
        identifier: &str,
        verbosity: Verbosity,
        progress_bar: bool,
        playlist: Option<PathBuf>,
    ) -> Self {
        Self {
            identifier: identifier.to_string(),
            verbosity,
            progress_bar,
            playlist,
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&mut Option<ProgressBar>)) {
        let mut bar = self.bar.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut bar);
    }

    fn start_bar(&self, length: u64, destination: &Path) {
        let style = ProgressStyle::with_template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓░");

        let bar = ProgressBar::new(length);
        bar.set_style(style);
        bar.set_message(file_name(destination));
        self.with_bar(|slot| *slot = Some(bar));
    }

    fn append_playlist(&self, destination: &Path) {
        let Some(playlist) = &self.playlist else {
            return;
        };

        if let Err(e) = append_to_playlist(playlist, destination) {
            eprintln!("{FAILURE}{} {e}", self.identifier.bold());
        }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FeedFetchStarted { source } => {
                if self.verbosity >= Verbosity::Verbose {
                    println!("{SEARCH}Fetching {}", source.cyan());
                }
            }

            ProgressEvent::FeedFetched {
                channel_title,
                version,
                total_items,
                candidates,
            } => {
                if self.verbosity >= Verbosity::Normal {
                    let title = channel_title.unwrap_or_else(|| self.identifier.clone());
                    println!(
                        "{HEADPHONES}{} • {} items, {} new",
                        title.bold().green(),
                        total_items.to_string().cyan(),
                        candidates.to_string().yellow()
                    );
                }
                tracing::debug!(channel = %self.identifier, %version, "feed version");
            }

            ProgressEvent::EnclosureStarted {
                mode,
                url,
                length,
                destination,
                ..
            } => match mode {
                SyncMode::List => {
                    println!("{LISTED}{} ({})", url, describe_size(length));
                }
                SyncMode::Catchup => {
                    if self.verbosity >= Verbosity::Verbose {
                        println!("{CATCHUP}Catching up {}", url.dimmed());
                    }
                }
                SyncMode::Update => {
                    if self.progress_bar {
                        self.start_bar(length, &destination);
                    } else if self.verbosity >= Verbosity::Verbose {
                        println!(
                            "{DOWNLOAD}Downloading {} ({}) to {}",
                            url.cyan(),
                            describe_size(length),
                            destination.display()
                        );
                    } else if self.verbosity >= Verbosity::Normal {
                        println!("{DOWNLOAD}{}", file_name(&destination));
                    }
                }
            },

            ProgressEvent::DownloadProgress {
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                self.with_bar(|slot| {
                    if let Some(bar) = slot {
                        if let Some(total) = total_bytes {
                            bar.set_length(total);
                        }
                        bar.set_position(bytes_downloaded);
                    }
                });
            }

            ProgressEvent::EnclosureCompleted {
                mode,
                destination,
                bytes_written,
                ..
            } => {
                self.with_bar(|slot| {
                    if let Some(bar) = slot.take() {
                        bar.finish_and_clear();
                    }
                });

                if mode == SyncMode::Update {
                    if self.verbosity >= Verbosity::Verbose {
                        println!(
                            "{SUCCESS}{} ({})",
                            file_name(&destination).green(),
                            HumanBytes(bytes_written.unwrap_or(0))
                        );
                    }
                    self.append_playlist(&destination);
                }
            }

            ProgressEvent::EnclosureFailed { url, error } => {
                self.with_bar(|slot| {
                    if let Some(bar) = slot.take() {
                        bar.abandon();
                    }
                });
                eprintln!("{FAILURE}{} {} - {}", "Failed:".red().bold(), url, error.red());
            }

            ProgressEvent::ChannelCompleted {
                processed,
                already_downloaded,
                filtered_out,
            } => {
                if self.verbosity >= Verbosity::Verbose {
                    println!(
                        "{SUCCESS}{}: {} processed, {} already downloaded, {} filtered out",
                        self.identifier.bold(),
                        processed.to_string().green(),
                        already_downloaded.to_string().yellow(),
                        filtered_out.to_string().dimmed()
                    );
                }
            }
        }
    }
}

fn describe_size(length: u64) -> String {
    if length == 0 {
        "unknown size".to_string()
    } else {
        HumanBytes(length).to_string()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("podspool=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn process_channel(
    config: &Config,
    identifier: &str,
    channel_dir: &Path,
    options: &SyncOptions,
    args: &Args,
) -> Result<()> {
    let channel_config = config.resolve(identifier)?;
    let channel = channel_config.to_channel(channel_dir)?;

    if args.new_only && channel.state_file.exists() {
        tracing::debug!(channel = identifier, "skipping channel with existing state");
        return Ok(());
    }

    let client = match channel_config.user_agent.as_deref() {
        Some(user_agent) => ReqwestClient::with_user_agent(user_agent),
        None => ReqwestClient::new(),
    }
    .context("Failed to build HTTP client")?;

    let reporter = Arc::new(ConsoleReporter::new(
        identifier,
        args.verbosity(),
        args.progress_bar,
        channel_config.playlist.clone(),
    ));

    sync_channel(&client, &channel, options, reporter).await?;
    Ok(())
}

/// Returns whether every channel succeeded
async fn run(args: &Args) -> Result<bool> {
    let channel_dir = default_channel_dir().context("Could not determine home directory")?;
    std::fs::create_dir_all(&channel_dir).with_context(|| {
        format!("Failed to create channel directory {}", channel_dir.display())
    })?;

    let rcfile = match &args.rcfile {
        Some(path) => path.clone(),
        None => default_config_path().context("Could not determine home directory")?,
    };
    let config = Config::load(&rcfile)?;

    let options = SyncOptions {
        mode: args.mode(),
        resume: args.resume,
        first_only: args.first_only,
        reverse: args.reverse,
        filter: args
            .filter
            .as_deref()
            .map(|pattern| EnclosureFilter::new(pattern, false))
            .transpose()?,
    };

    let identifiers: Vec<String> = if args.channels.is_empty() {
        config.identifiers().map(str::to_string).collect()
    } else {
        args.channels.clone()
    };

    let mut all_succeeded = true;
    for identifier in &identifiers {
        if let Err(e) = process_channel(&config, identifier, &channel_dir, &options, args).await {
            all_succeeded = false;
            eprintln!("{FAILURE}{} {}: {e:#}", "Error".red().bold(), identifier.bold());
        }
    }

    Ok(all_succeeded)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.debug);

    match run(&args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{FAILURE}{} {e:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
