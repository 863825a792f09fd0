//! Batch copy engine
//!
//! Streams rows from a source [`Cursor`] into a destination [`Connection`]
//! using multi-row INSERT statements. Works with drivers that lack
//! transactions or affected-row counts by downgrading once per copy.

use tokio_util::sync::CancellationToken;

use crate::driver::{Connection, Cursor};
use crate::error::CopyFailure;
use crate::placeholder::Placeholder;

mod engine;
pub mod target;

#[cfg(test)]
mod testing;

pub use engine::copy_rows;
pub use target::Target;

/// Default number of rows per INSERT
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Configuration for a copy
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Rows per INSERT statement
    pub batch_size: usize,
    /// Bind-parameter syntax of the destination driver
    pub placeholder: Placeholder,
    /// Checked before every blocking step
    pub cancel: CancellationToken,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            placeholder: Placeholder::default(),
            cancel: CancellationToken::new(),
        }
    }
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_placeholder(mut self, placeholder: Placeholder) -> Self {
        self.placeholder = placeholder;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Reusable copy handler bound to a set of options
#[derive(Debug, Clone, Default)]
pub struct Copier {
    options: CopyOptions,
}

impl Copier {
    pub fn new(options: CopyOptions) -> Self {
        Self { options }
    }

    /// Handler with default options and the given placeholder syntax
    pub fn with_placeholder(placeholder: Placeholder) -> Self {
        Self::new(CopyOptions::default().with_placeholder(placeholder))
    }

    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    pub fn copy(
        &self,
        cursor: &mut dyn Cursor,
        connection: &dyn Connection,
        target: &str,
    ) -> Result<u64, CopyFailure> {
        copy_rows(cursor, connection, target, &self.options)
    }
}
