use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use podsync::{
    Config, NoopReporter, ProgressEvent, ProgressReporter, RefreshOutcome, ReqwestClient,
    RewritePattern, SharedProgressReporter, Store, SyncOptions, ensure_config_dir, probe_feed,
    run_sync,
};

// Emoji with fallback for terminals without Unicode support
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");

/// Refresh podcast feeds and download new episodes
#[derive(Parser, Debug)]
#[command(name = "podsync")]
#[command(about = "Refresh podcast feeds and download new episodes")]
#[command(version)]
struct Args {
    /// Path of the configuration directory
    #[arg(short = 'c', long, default_value_os_t = default_confdir())]
    confdir: PathBuf,

    /// Number of simultaneous downloads
    #[arg(short = 'd', long = "downloads", default_value = "4")]
    downloads: usize,

    /// HTTP idle timeout in seconds for feed and probe requests
    #[arg(short = 't', long, default_value = "5.0")]
    timeout: f64,

    /// Probe a feed's download links for their final URLs
    #[arg(short = 'p', long)]
    probe: Option<String>,

    /// Rewrite pattern to preview against probed download URLs
    #[arg(short = 's', long)]
    sed: Option<String>,

    /// Refresh episode lists only, skip downloads
    #[arg(short = 'r', long)]
    refresh: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn default_confdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".podsync")
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<usize, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_style = ProgressStyle::default_bar()
            .template("{spinner:.green} {wide_msg}")
            .unwrap();

        let main_bar = multi.add(ProgressBar::new_spinner());
        main_bar.set_style(main_style);
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, download_id: usize) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();

        if let Some(bar) = bars.get(&download_id) {
            return bar.clone();
        }

        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap()
            .progress_chars("█▓░");

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(style);
        bars.insert(download_id, bar.clone());
        bar
    }

    fn finish_bar(&self, download_id: usize) {
        let mut bars = self.bars.lock().unwrap();
        if let Some(bar) = bars.remove(&download_id) {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::RefreshPhaseStarting { feeds } => {
                self.main_bar.set_message(format!(
                    "{SEARCH}Refreshing {} feeds",
                    feeds.to_string().cyan()
                ));
            }

            ProgressEvent::FeedRefreshed { podname, outcome } => {
                let line = match outcome {
                    RefreshOutcome::Ingested(items) => {
                        format!("  {} {} items", podname.bold(), items.to_string().cyan())
                    }
                    RefreshOutcome::SkipDisabled => {
                        format!("  {} {}", podname.bold(), "disabled".dimmed())
                    }
                    RefreshOutcome::NetworkFailed => {
                        format!("  {} {}", podname.bold(), "network failure".red())
                    }
                    RefreshOutcome::HttpFailed(status) => {
                        format!("  {} {}", podname.bold(), format!("HTTP/{status}").red())
                    }
                    RefreshOutcome::ParseFailed => {
                        format!("  {} {}", podname.bold(), "unparseable feed".red())
                    }
                };
                self.main_bar.println(line);
            }

            ProgressEvent::RefreshPhaseCompleted { pending } => {
                self.main_bar.set_message(format!(
                    "{DOWNLOAD}{} pending episodes",
                    pending.to_string().yellow()
                ));
            }

            ProgressEvent::DownloadStarting {
                download_id,
                title,
                episode_index,
                total_to_download,
                content_length,
                resumed_at,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_length(resumed_at + content_length.unwrap_or(0));
                bar.set_position(resumed_at);
                bar.set_message(format!(
                    "[{}/{}] {}",
                    (episode_index + 1).to_string().cyan(),
                    total_to_download.to_string().cyan(),
                    truncate_title(&title, 40)
                ));
            }

            ProgressEvent::DownloadProgress {
                download_id,
                bytes_downloaded,
                total_bytes,
                ..
            } => {
                let bar = self.get_or_create_bar(download_id);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                download_id,
                title,
                bytes_downloaded,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.set_position(bytes_downloaded);
                bar.set_message(format!("{SUCCESS}{}", truncate_title(&title, 40).green()));
                self.finish_bar(download_id);
            }

            ProgressEvent::DownloadFailed {
                download_id,
                title,
                error,
            } => {
                let bar = self.get_or_create_bar(download_id);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&title, 30).red(),
                    error.red()
                ));
                self.finish_bar(download_id);
            }

            ProgressEvent::SyncCompleted {
                downloaded,
                already_complete,
                skipped,
                failed,
            } => {
                self.main_bar.finish_and_clear();
                println!(
                    "\n{PARTY}{} {} downloaded, {} verified, {} skipped, {} failed",
                    "Sync complete:".bold().green(),
                    downloaded.to_string().green().bold(),
                    already_complete.to_string().green(),
                    skipped.to_string().yellow(),
                    if failed > 0 {
                        failed.to_string().red().bold()
                    } else {
                        failed.to_string().green()
                    }
                );
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.len() <= max_len {
        title.to_string()
    } else {
        let cut: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let timeout = Duration::from_secs_f64(args.timeout);
    let client = ReqwestClient::new().context("building HTTP client")?;

    if let Some(probe_url) = &args.probe {
        let pattern = match &args.sed {
            Some(raw) => Some(RewritePattern::parse(raw).context("invalid --sed pattern")?),
            None => None,
        };

        if let Err(err) = probe_feed(&client, probe_url, timeout, pattern.as_ref()).await {
            eprintln!("{err}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let config_path =
        ensure_config_dir(&args.confdir).context("preparing configuration directory")?;
    let config = Config::load(&config_path).context("loading configuration")?;

    let store = Store::open(&args.confdir.join(podsync::config::STORE_FILE))
        .context("opening episode store")?;
    store.ensure_schema().context("initializing episode store")?;

    let options = SyncOptions {
        concurrency: args.downloads,
        feed_timeout: timeout,
        refresh_only: args.refresh,
    };

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(IndicatifReporter::new())
    };

    let summary = run_sync(&client, &config, &store, &options, reporter)
        .await
        .context("sync run failed")?;

    if args.refresh && !args.quiet {
        println!(
            "{SUCCESS}Found {} pending episodes",
            summary.pending.to_string().cyan()
        );
    }

    Ok(())
}
