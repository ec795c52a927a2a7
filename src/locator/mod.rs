//! Caller self-location from stack traces.
//!
//! A test file asks "which script am I?" by capturing a stack trace and
//! handing it to a [`StackLocator`]. The innermost script frame is the
//! utility doing the capturing; the next distinct one is the caller. Its URL
//! is then turned into a project-relative path by stripping the scheme, the
//! host and the runner's root prefix (`/base/` by default).
//!
//! Only scripts served over `http`/`https` with a `.js` extension are
//! recognised, and query strings are dropped because matching stops at the
//! first `.js`.

mod frames;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::{DEFAULT_ROOT_PREFIX, TestUtilConfig, normalise_root_prefix};

pub use frames::{FrameSource, StaticTrace};

static HTTP_FRAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://").expect("valid frame regex"));
static SCRIPT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://.*?\.js").expect("valid script url regex"));
static SCHEME_AND_HOST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^/]*").expect("valid host regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("stack trace has {found} script frame(s); at least two are needed")]
    NoScriptFrames { found: usize },
    #[error("no caller frame found below {own}")]
    CallerNotFound { own: String },
    #[error("could not capture stack trace: {0}")]
    Source(String),
}

/// Script URLs of every `http(s)` frame, innermost first.
///
/// Lines without a `.js` URL are kept verbatim.
pub fn script_urls<S: AsRef<str>>(frames: &[S]) -> Vec<String> {
    frames
        .iter()
        .map(AsRef::<str>::as_ref)
        .filter(|line| HTTP_FRAME.is_match(line))
        .map(|line| match SCRIPT_URL.find(line) {
            Some(found) => found.as_str().to_string(),
            None => line.to_string(),
        })
        .collect()
}

/// URL of the script that called the capturing utility.
///
/// The first script frame is the utility itself. Every frame from that script
/// is dropped, however deep the utility's own call chain, and the next
/// remaining frame is returned.
pub fn caller_script_url<S: AsRef<str>>(frames: &[S]) -> Result<String, LocationError> {
    let mut scripts = script_urls(frames);
    if scripts.len() < 2 {
        return Err(LocationError::NoScriptFrames {
            found: scripts.len(),
        });
    }

    let own = scripts.remove(0);
    scripts.retain(|script| *script != own);

    scripts
        .into_iter()
        .next()
        .ok_or(LocationError::CallerNotFound { own })
}

/// A resolved caller script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLocation {
    url: String,
    path: String,
}

impl ScriptLocation {
    /// Derive the project-relative path of `url`.
    ///
    /// Outside `root_prefix` only the leading `/` is stripped. Degraded
    /// frames that are not URLs are kept as they are.
    pub fn from_url(url: impl Into<String>, root_prefix: &str) -> Self {
        let url = url.into();
        let path = match SCHEME_AND_HOST.find(&url) {
            Some(host) => {
                let rest = &url[host.end()..];
                rest.strip_prefix(root_prefix)
                    .or_else(|| rest.strip_prefix('/'))
                    .unwrap_or(rest)
                    .to_string()
            }
            None => url.clone(),
        };
        Self { url, path }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Every path segment but the last; empty for a top-level script.
    pub fn dir(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or("")
    }
}

/// Locates the caller of a trace-capturing utility.
#[derive(Debug, Clone)]
pub struct StackLocator<S> {
    source: S,
    root_prefix: String,
}

impl<S: FrameSource> StackLocator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            root_prefix: DEFAULT_ROOT_PREFIX.to_string(),
        }
    }

    pub fn from_config(source: S, config: &TestUtilConfig) -> Self {
        Self::new(source).with_root_prefix(&config.root_prefix)
    }

    pub fn with_root_prefix(mut self, prefix: &str) -> Self {
        self.root_prefix = normalise_root_prefix(prefix);
        self
    }

    pub fn root_prefix(&self) -> &str {
        &self.root_prefix
    }

    pub fn locate(&self) -> Result<ScriptLocation, LocationError> {
        let frames = self.source.frames()?;
        let url = caller_script_url(&frames)?;
        Ok(ScriptLocation::from_url(url, &self.root_prefix))
    }

    pub fn script_url(&self) -> Result<String, LocationError> {
        self.locate().map(|location| location.url)
    }

    pub fn script_path(&self) -> Result<String, LocationError> {
        self.locate().map(|location| location.path)
    }

    pub fn script_dir(&self) -> Result<String, LocationError> {
        self.locate().map(|location| location.dir().to_string())
    }
}
