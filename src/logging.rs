use std::fmt;

use crate::page::PageId;

/// Logger for in-page activity.
///
/// Every line carries the page instance id, so events from a page and the
/// page that replaced it can be told apart. Tokens are [`Secret`] values and
/// print redacted when formatted.
///
/// [`Secret`]: crate::Secret
///
/// ```
/// use shell_bridge::PageLog;
///
/// let log = PageLog::new(7);
/// log.info(format_args!("hooks installed"));
/// assert_eq!(log.page_id(), 7);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PageLog {
    page_id: PageId,
}

impl PageLog {
    pub fn new(page_id: PageId) -> Self {
        Self { page_id }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(page_id = self.page_id, "{}", args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(page_id = self.page_id, "{}", args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!(page_id = self.page_id, "{}", args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(page_id = self.page_id, "{}", args);
    }
}
