//! Shared configuration, error types and store key layout for lettergate.

pub mod config;
pub mod error;
pub mod keys;
pub mod time;

pub use config::*;
pub use error::{StoreError, StoreResult};
pub use keys::KeySpace;
