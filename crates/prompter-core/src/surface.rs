//! Capabilities the presentation layer exposes to the diagnostics core.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    #[error("surface is not mounted")]
    NotMounted,
    #[error("surface rejected line: {message}")]
    Rejected { message: String },
}

impl SurfaceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// A widget that may or may not have been constructed yet.
pub trait UiSurface {
    fn is_mounted(&self) -> bool;
}

/// Ordered, scrollable text view the event log renders into.
pub trait LogSurface: UiSurface {
    fn append_line(&mut self, line: &str) -> Result<(), SurfaceError>;

    /// Brings the most recently appended line into view.
    fn scroll_to_end(&mut self);
}

/// Editable request field that history selections are replayed into.
pub trait RequestInput {
    fn set_text(&mut self, text: &str);
}

impl RequestInput for String {
    fn set_text(&mut self, text: &str) {
        self.clear();
        self.push_str(text);
    }
}
