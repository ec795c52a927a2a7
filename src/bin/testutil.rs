//! Test utility CLI.
//!
//! Usage examples:
//!   Resolve the caller recorded in a captured stack trace:
//!     $ cargo run --bin testutil -- locate --trace trace.txt
//!   Wait for an element on a live page (Chromiumoxide):
//!     $ TESTUTIL_CHROME_BIN=/path/to/chrome \
//!       cargo run --bin testutil -- wait-for --url https://example.com --selector h1

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use testutil_rs::adapter::{ChromiumSession, LaunchOptions};
use testutil_rs::config::{TestUtilConfig, TestUtilConfigOverrides, Verbosity};
use testutil_rs::locator::{StackLocator, StaticTrace};
use testutil_rs::report::LoggingReporter;
use testutil_rs::waiter::{Check, WaitOptions, Waiter};

#[derive(Parser)]
#[command(name = "testutil", author, version, about = "Browser test utilities")]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the caller script recorded in a stack trace file.
    Locate(LocateArgs),
    /// Open a page and wait until a selector matches.
    WaitFor(WaitForArgs),
}

#[derive(Args)]
struct LocateArgs {
    /// File containing the captured stack trace, one frame per line.
    #[arg(long)]
    trace: PathBuf,

    /// Path prefix under which the runner serves project files.
    #[arg(long)]
    root_prefix: Option<String>,
}

#[derive(Args)]
struct WaitForArgs {
    /// Page URL to open.
    #[arg(long)]
    url: String,

    /// Query selector to wait for.
    #[arg(long)]
    selector: String,

    /// Chrome executable; falls back to TESTUTIL_CHROME_BIN.
    #[arg(long)]
    chrome: Option<PathBuf>,

    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    interval_ms: Option<u64>,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let config = TestUtilConfig::from_env()
        .context("invalid TESTUTIL_* environment")?
        .with_overrides(
            TestUtilConfigOverrides::default().verbose(verbosity_from_count(cli.verbose)),
        );

    match cli.command {
        Command::Locate(args) => run_locate(args, &config).await,
        Command::WaitFor(args) => run_wait_for(args, &config).await,
    }
}

async fn run_locate(args: LocateArgs, config: &TestUtilConfig) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.trace)
        .await
        .with_context(|| format!("failed to read {}", args.trace.display()))?;

    let mut locator = StackLocator::from_config(StaticTrace::new(text), config);
    if let Some(prefix) = &args.root_prefix {
        locator = locator.with_root_prefix(prefix);
    }

    let location = locator
        .locate()
        .with_context(|| format!("no caller script in {}", args.trace.display()))?;

    println!("url:  {}", location.url());
    println!("path: {}", location.path());
    println!("dir:  {}", location.dir());
    Ok(())
}

async fn run_wait_for(args: WaitForArgs, config: &TestUtilConfig) -> Result<()> {
    let chrome_executable = args.chrome.clone().or_else(|| {
        env::var("TESTUTIL_CHROME_BIN")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
    });

    let mut options = config.wait_options();
    if let Some(timeout_ms) = args.timeout_ms {
        options = options.with_timeout_ms(timeout_ms);
    }
    if let Some(interval_ms) = args.interval_ms {
        options = options.with_interval_ms(interval_ms);
    }

    let session = ChromiumSession::launch(&LaunchOptions {
        chrome_executable,
        headless: !args.show_browser,
    })
    .await
    .context("failed to launch chromium")?;

    let outcome = wait_in_session(&session, &args, config, options).await;
    if let Err(err) = session.close().await {
        error!("failed to close browser: {err}");
    }
    outcome
}

async fn wait_in_session(
    session: &ChromiumSession,
    args: &WaitForArgs,
    config: &TestUtilConfig,
    options: WaitOptions,
) -> Result<()> {
    let document = session
        .open(&args.url)
        .await
        .with_context(|| format!("failed to open {}", args.url))?;
    info!("Opened {}", args.url);

    let logger = Arc::new(config.build_logger());
    let reporter = LoggingReporter::new(Arc::clone(&logger));
    let waiter = Waiter::from_config(config, Arc::new(reporter))
        .with_logger(logger)
        .with_document(Arc::new(document));

    match waiter.wait(Check::selector(&args.selector), Some(options)).await {
        Ok(()) => {
            info!("'{}' matched on {}", args.selector, args.url);
            Ok(())
        }
        Err(err) => bail!("waiting for '{}' failed: {err}", args.selector),
    }
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Minimal,
        1 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
