//! Centralized error handling for the W-phase publisher
//!
//! # Error Categories
//!
//! - **Normalization Errors**: required payload fields missing or uncoercible
//! - **Graph Build Errors**: required entities could not be constructed
//! - **Sink Errors**: isolated per-sink publish failures
//! - **Configuration Errors**: invalid option combinations, raised before any work
//! - **Compute Errors**: the external moment tensor computation failed
//!
//! # Usage
//!
//! ```rust
//! use wphase_publish::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     // Function can return any error type that converts to AppError
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for normalization Results
pub type NormalizationResult<T> = Result<T, NormalizationError>;

/// Convenience type alias for sink Results
pub type SinkResult<T> = Result<T, SinkError>;
