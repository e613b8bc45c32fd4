//! Error conversion helpers for common I/O operations
//!
//! Provides extension traits for cleaner error handling with context.

use std::fmt::Display;
use std::io;

use crate::application::{ApplicationError, ApplicationResult};

/// Extension trait for converting `io::Result` to `ApplicationResult` with context.
pub trait IoResultExt<T> {
    /// Add what was being done, and to what, to an I/O error.
    ///
    /// # Example
    /// ```ignore
    /// store.load().with_context("load network", store.location())?;
    /// ```
    fn with_context(self, action: &str, target: impl Display) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_context(self, action: &str, target: impl Display) -> ApplicationResult<T> {
        self.map_err(|e| ApplicationError::OperationFailed {
            context: format!("{}: {}", action, target),
            source: Box::new(e),
        })
    }
}
