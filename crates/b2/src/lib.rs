//! b2-client: Backblaze B2 API adapter
//!
//! This crate talks HTTP to the B2 service on top of the types in `b2-core`:
//! - [`AuthSession`] keeps the account authorization fresh
//! - [`B2Client`] performs JSON API calls with the configured retry policy
//! - [`Bucket`] caches its upload endpoint and carries the file operations
//! - [`Download`] streams file content and verifies it

mod bucket;
mod client;
mod error;
mod listing;
mod session;
mod transfer;
mod wire;

pub use bucket::{Bucket, UploadAuthorization};
pub use client::B2Client;
pub use listing::{FileNamePages, FileVersionPages, MAX_PAGE_SIZE};
pub use session::{AuthSession, SessionState};
pub use transfer::{Download, hash_buffered, hash_seekable};
