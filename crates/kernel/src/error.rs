//! Error types for the kernel crate.
//!
//! Kernel *breaks* are not represented here — they are data
//! (`BreakReason`) folded into a returned `Status` or `bool`, never raised.
//! `KernelError` is reserved for genuine construction/setup failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
