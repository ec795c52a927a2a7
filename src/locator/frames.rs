//! Where stack traces come from.

use super::LocationError;

/// Supplies the raw lines of a stack trace captured at the point of call.
///
/// A browser-backed source must capture the trace from a thrown and caught
/// error; some engines only populate traces during exception dispatch.
pub trait FrameSource {
    fn frames(&self) -> Result<Vec<String>, LocationError>;
}

impl<F> FrameSource for F
where
    F: Fn() -> Result<Vec<String>, LocationError>,
{
    fn frames(&self) -> Result<Vec<String>, LocationError> {
        self()
    }
}

/// A trace captured elsewhere, e.g. read from a file or copied from a runner
/// log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticTrace {
    text: String,
}

impl StaticTrace {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl FrameSource for StaticTrace {
    fn frames(&self) -> Result<Vec<String>, LocationError> {
        Ok(self.text.lines().map(str::to_string).collect())
    }
}
