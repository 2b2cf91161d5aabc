//! The legacy-to-applications pipeline.
//!
//! [`batch::run_migration`] streams legacy tasks in id order and hands each
//! one to a [`task::TaskMigrator`], which resolves references through a
//! per-run [`resolvers::RunContext`] and syncs form-field schemas on first
//! sight of each application type.

pub mod batch;
pub mod catalog;
pub mod resolvers;
pub mod schema;
pub mod task;

#[cfg(test)]
mod fixtures;

use crate::store::legacy::TaskFilter;

pub use batch::{RowFailure, RunReport, RunStats, run_migration};

pub const DEFAULT_CHUNK_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Resolve and count everything, write nothing.
    pub dry_run: bool,
    pub skip_payments: bool,
    pub chunk_size: usize,
    /// Stop after this many tasks have been seen.
    pub limit: Option<usize>,
    pub filter: TaskFilter,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            skip_payments: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            limit: None,
            filter: TaskFilter::default(),
        }
    }
}
