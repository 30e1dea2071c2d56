//! b2-core: Core library for the b2 CLI client
//!
//! This crate provides the pieces of the client that do not talk HTTP:
//! - Configuration management
//! - The error taxonomy and the service-error classifier
//! - Retry policies
//! - Domain types shared by the API adapter and the CLI
//!
//! The HTTP adapter lives in `b2-client`, which builds on these types.

pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{Config, ConfigManager, RetryConfig, RetryMode};
pub use error::{Error, Result, ServiceError};
pub use retry::{
    Backoff, NoRetry, RetryBuilder, RetryPolicy, SingleRetry, is_fatal, retry_with_policy,
};
pub use types::{
    BucketInfo, BucketType, Credentials, FileAction, FileDescriptor, FileRange, ListCursor,
    ListingPage,
};
