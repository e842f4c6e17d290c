//! Utility functions and supporting infrastructure.
//!
//! Provides bit-level reading for header parsing and the error types shared
//! by every stage of the pipeline.

use std::sync::{Mutex, MutexGuard};

pub mod bitstream_io;
pub mod errors;

#[cfg(test)]
pub(crate) mod synth;

/// Locks `mutex`, recovering the data when a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
