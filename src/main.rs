use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use webwitness::config::ScreenshotFormat;
use webwitness::fingerprint::Fingerprinter;
use webwitness::logging::init_logger;
use webwitness::{drivers, writers, Options, Runner};

/// Probe a list of URLs with a headless browser and record what happened.
#[derive(Parser, Debug)]
#[command(name = "webwitness", version, about)]
struct Cli {
    /// File with target URLs, one per line ("-" reads stdin)
    #[arg(short, long, default_value = "-")]
    file: String,

    /// Driver back-end to use (isolated, shared)
    #[arg(long, default_value = "isolated")]
    driver: String,

    /// Number of concurrent probe workers
    #[arg(long, default_value_t = 6)]
    workers: usize,

    /// Per-target navigation timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Seconds to wait between navigation and screenshot
    #[arg(long, default_value_t = 0)]
    delay: u64,

    /// Path to a browser binary (auto-detected when unset)
    #[arg(long)]
    chrome_path: Option<String>,

    /// DevTools websocket URL of an existing browser to connect to
    #[arg(long)]
    wss_url: Option<String>,

    /// Proxy server for browser traffic
    #[arg(long)]
    proxy: Option<String>,

    /// User-Agent override
    #[arg(long)]
    user_agent: Option<String>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,

    /// Browser window width
    #[arg(long, default_value_t = 1920)]
    window_x: u32,

    /// Browser window height
    #[arg(long, default_value_t = 1080)]
    window_y: u32,

    /// Directory to write screenshots into
    #[arg(long, default_value = "screenshots")]
    screenshot_path: PathBuf,

    /// Screenshot format (jpeg, png)
    #[arg(long, default_value = "jpeg")]
    screenshot_format: String,

    /// Capture the full, scrolled page
    #[arg(long)]
    full_page: bool,

    /// Embed screenshots (base64) in results handed to writers
    #[arg(long)]
    embed_screenshot: bool,

    /// Do not write screenshots to disk
    #[arg(long)]
    skip_screenshots: bool,

    /// Do not store page HTML
    #[arg(long)]
    skip_html: bool,

    /// CSS selector to screenshot instead of the page
    #[arg(long)]
    selector: Option<String>,

    /// JavaScript to evaluate on every page
    #[arg(long)]
    javascript: Option<String>,

    /// File with JavaScript to evaluate on every page
    #[arg(long)]
    javascript_file: Option<String>,

    /// Store sub-request response bodies (can be huge)
    #[arg(long)]
    save_content: bool,

    /// Write results to a SQLite database
    #[arg(long)]
    write_db: bool,

    /// SQLite URI for --write-db
    #[arg(long, default_value = "sqlite://webwitness.sqlite3")]
    db_uri: String,

    /// Write results to a CSV file
    #[arg(long)]
    write_csv: bool,

    /// CSV file for --write-csv
    #[arg(long, default_value = "webwitness.csv")]
    csv_file: PathBuf,

    /// Write results as JSON lines
    #[arg(long)]
    write_jsonl: bool,

    /// JSONL file for --write-jsonl
    #[arg(long, default_value = "webwitness.jsonl")]
    jsonl_file: PathBuf,

    /// Print a result line per target
    #[arg(long)]
    write_stdout: bool,

    /// Show debug logging
    #[arg(long)]
    debug: bool,

    /// Disable all logging
    #[arg(short, long)]
    quiet: bool,

    /// Do not log per-target scan errors
    #[arg(long)]
    no_scan_error_logs: bool,
}

impl Cli {
    fn into_options(self) -> Result<Options> {
        let mut options = Options::default();

        options.logging.debug = self.debug;
        options.logging.silence = self.quiet;
        options.logging.log_scan_errors = !self.no_scan_error_logs;

        if let Some(path) = self.chrome_path {
            options.chrome.binary_path = path;
        }
        if let Some(wss) = self.wss_url {
            options.chrome.wss_url = wss;
        }
        if let Some(proxy) = self.proxy {
            options.chrome.proxy = proxy;
        }
        if let Some(user_agent) = self.user_agent {
            options.chrome.user_agent = user_agent;
        }
        options.chrome.extra_headers = self.headers;
        options.chrome.window_x = self.window_x;
        options.chrome.window_y = self.window_y;

        options.scan.driver_name = self.driver;
        options.scan.workers = self.workers;
        options.scan.timeout_seconds = self.timeout;
        options.scan.delay_seconds = self.delay;
        options.scan.skip_html = self.skip_html;
        options.scan.screenshot_path = self.screenshot_path;
        options.scan.screenshot_format = match ScreenshotFormat::parse(&self.screenshot_format) {
            Some(format) => format,
            None => bail!("invalid screenshot format: {}", self.screenshot_format),
        };
        options.scan.screenshot_full_page = self.full_page;
        options.scan.screenshot_embed_in_result = self.embed_screenshot;
        options.scan.screenshot_skip_disk = self.skip_screenshots;
        options.scan.selector = self.selector.unwrap_or_default();
        options.scan.javascript = self.javascript.unwrap_or_default();
        options.scan.javascript_file = self.javascript_file.unwrap_or_default();
        options.scan.save_content = self.save_content;

        options.writer.db = self.write_db;
        options.writer.db_uri = self.db_uri;
        options.writer.csv = self.write_csv;
        options.writer.csv_file = self.csv_file;
        options.writer.jsonl = self.write_jsonl;
        options.writer.jsonl_file = self.jsonl_file;
        options.writer.stdout = self.write_stdout;

        Ok(options)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let file = cli.file.clone();
    let options = cli.into_options()?;

    init_logger(&options.logging).context("failed to initialize logger")?;

    let fingerprinter =
        Arc::new(Fingerprinter::new().context("failed to initialize fingerprint engine")?);
    let driver = drivers::from_options(&options, fingerprinter)
        .await
        .context("failed to initialize driver")?;
    let writers = writers::from_config(&options.writer)
        .await
        .context("failed to initialize writers")?;
    if writers.is_empty() {
        info!("no writers configured; results will only exist as screenshots");
    }

    let runner = Runner::new(options, driver, writers).context("failed to initialize runner")?;
    let targets = runner.targets();

    // Feed targets from the input; the reader owns the channel and closes it
    // by finishing.
    let reader_task = tokio::spawn(async move {
        let mut count = 0usize;
        if file == "-" {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            count += feed_lines(&mut lines, &targets).await;
        } else {
            let opened = match tokio::fs::File::open(&file).await {
                Ok(opened) => opened,
                Err(e) => {
                    warn!("failed to open input file {file}: {e}");
                    return 0;
                }
            };
            let mut lines = BufReader::new(opened).lines();
            count += feed_lines(&mut lines, &targets).await;
        }
        count
    });

    runner.run().await;
    runner.close().await;

    if let Ok(count) = reader_task.await {
        info!("done; {count} targets read from input");
    }

    Ok(())
}

async fn feed_lines<R: tokio::io::AsyncBufRead + Unpin>(
    lines: &mut tokio::io::Lines<R>,
    targets: &tokio::sync::mpsc::Sender<String>,
) -> usize {
    let mut count = 0usize;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                if targets.send(trimmed.to_string()).await.is_err() {
                    // All workers exited; nothing left to feed.
                    return count;
                }
                count += 1;
            }
            Ok(None) => return count,
            Err(e) => {
                warn!("failed to read line from input: {e}");
            }
        }
    }
}
