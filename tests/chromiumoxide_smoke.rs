use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;
use testutil_rs::adapter::{ChromiumSession, LaunchOptions};
use testutil_rs::report::FailureLog;
use testutil_rs::waiter::{WaitOptions, Waiter};

fn chrome_bin() -> Option<PathBuf> {
    let chrome_bin = match env::var("TESTUTIL_CHROME_BIN") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => {
            eprintln!("skipping chromiumoxide integration test: TESTUTIL_CHROME_BIN not set");
            return None;
        }
    };

    if !chrome_bin.exists() {
        eprintln!(
            "skipping chromiumoxide integration test: chrome executable not found at {}",
            chrome_bin.display()
        );
        return None;
    }
    Some(chrome_bin)
}

#[tokio::test]
async fn selector_wait_against_live_page() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let Some(chrome_bin) = chrome_bin() else {
        return Ok(());
    };

    let session = ChromiumSession::launch(&LaunchOptions {
        chrome_executable: Some(chrome_bin),
        headless: true,
    })
    .await
    .context("failed to launch chromium")?;

    let document = session
        .open("data:text/html,<h1>Example</h1>")
        .await
        .context("failed to open page")?;

    let log = Arc::new(FailureLog::new());
    let waiter = Waiter::new(log.clone())
        .with_document(Arc::new(document))
        .with_options(WaitOptions::new(5_000, 100));

    waiter
        .wait("h1", None)
        .await
        .context("heading never appeared")?;
    info!("heading found");

    let missing = waiter
        .wait("#does-not-exist", Some(WaitOptions::new(500, 100)))
        .await;
    assert!(missing.expect_err("absent element").is_timeout());
    assert_eq!(log.len(), 1);

    session.close().await.context("failed to close chromium")?;
    Ok(())
}
