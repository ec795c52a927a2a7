//! Conditions a [`Waiter`](super::Waiter) can poll.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;

/// Error raised by a check or read while it was being evaluated.
pub type CheckError = Box<dyn std::error::Error + Send + Sync + 'static>;

type PredicateFn = Box<dyn FnMut() -> Result<bool, CheckError> + Send + 'static>;

/// Presence lookups against the document under test.
#[async_trait]
pub trait DocumentQuery: Send + Sync {
    /// Whether an element matching `selector` currently exists.
    async fn has_match(&self, selector: &str) -> Result<bool, CheckError>;
}

/// A condition polled until it holds.
pub enum Check {
    /// Zero-argument closure evaluated on every tick.
    Predicate(PredicateFn),
    /// Query selector that holds once a matching element is present.
    Selector(String),
}

impl Check {
    pub fn predicate<F>(mut predicate: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        Check::Predicate(Box::new(move || Ok::<_, CheckError>(predicate())))
    }

    /// A predicate whose errors end the wait immediately.
    pub fn try_predicate<F, E>(mut predicate: F) -> Self
    where
        F: FnMut() -> Result<bool, E> + Send + 'static,
        E: Into<CheckError>,
    {
        Check::Predicate(Box::new(move || {
            predicate().map_err(Into::<CheckError>::into)
        }))
    }

    pub fn selector(selector: impl Into<String>) -> Self {
        Check::Selector(selector.into())
    }

    pub fn as_selector(&self) -> Option<&str> {
        match self {
            Check::Selector(selector) => Some(selector),
            Check::Predicate(_) => None,
        }
    }
}

impl From<&str> for Check {
    fn from(selector: &str) -> Self {
        Check::selector(selector)
    }
}

impl From<String> for Check {
    fn from(selector: String) -> Self {
        Check::Selector(selector)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Predicate(_) => f.write_str("Check::Predicate(..)"),
            Check::Selector(selector) => f.debug_tuple("Check::Selector").field(selector).finish(),
        }
    }
}

/// A [`Check`] bound to whatever it needs to be evaluated.
pub(crate) enum Condition {
    Predicate(PredicateFn),
    Selector {
        selector: String,
        document: Arc<dyn DocumentQuery>,
    },
}

impl Condition {
    pub(crate) async fn evaluate(&mut self) -> Result<bool, CheckError> {
        match self {
            Condition::Predicate(predicate) => call_guarded(predicate.as_mut()),
            Condition::Selector { selector, document } => document.has_match(selector).await,
        }
    }
}

/// Run a check, turning a panic inside it into a [`CheckError`].
pub(crate) fn call_guarded<T>(
    f: &mut (dyn FnMut() -> Result<T, CheckError> + Send),
) -> Result<T, CheckError> {
    match panic::catch_unwind(AssertUnwindSafe(|| f())) {
        Ok(result) => result,
        Err(payload) => Err(format!("check panicked: {}", panic_message(payload.as_ref())).into()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDocument(bool);

    #[async_trait]
    impl DocumentQuery for FixedDocument {
        async fn has_match(&self, _selector: &str) -> Result<bool, CheckError> {
            Ok(self.0)
        }
    }

    fn bind(check: Check) -> Condition {
        match check {
            Check::Predicate(predicate) => Condition::Predicate(predicate),
            Check::Selector(selector) => Condition::Selector {
                selector,
                document: Arc::new(FixedDocument(true)),
            },
        }
    }

    #[tokio::test]
    async fn predicate_result_is_forwarded() {
        let mut calls = 0;
        let mut condition = bind(Check::predicate(move || {
            calls += 1;
            calls > 1
        }));
        assert!(!condition.evaluate().await.unwrap());
        assert!(condition.evaluate().await.unwrap());
    }

    #[tokio::test]
    async fn try_predicate_error_is_preserved() {
        let mut condition = bind(Check::try_predicate(|| {
            Err::<bool, _>(std::io::Error::other("lookup failed"))
        }));
        let err = condition.evaluate().await.expect_err("error propagates");
        assert_eq!(err.to_string(), "lookup failed");
    }

    #[tokio::test]
    async fn panicking_predicate_becomes_error() {
        let mut condition = bind(Check::predicate(|| panic!("element detached")));
        let err = condition.evaluate().await.expect_err("panic captured");
        assert_eq!(err.to_string(), "check panicked: element detached");
    }

    #[tokio::test]
    async fn selector_consults_document() {
        let mut condition = bind(Check::from("#ready"));
        assert!(condition.evaluate().await.unwrap());
    }

    #[test]
    fn strings_convert_to_selectors() {
        assert_eq!(Check::from("div.item").as_selector(), Some("div.item"));
        assert_eq!(
            Check::from(String::from("#id")).as_selector(),
            Some("#id")
        );
        assert!(Check::predicate(|| true).as_selector().is_none());
    }
}
