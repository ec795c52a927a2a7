//! Browser adapters for selector checks.

pub mod chromiumoxide;

pub use self::chromiumoxide::{BrowserError, ChromiumDocument, ChromiumSession, LaunchOptions};
