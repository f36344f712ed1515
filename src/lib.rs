//! # sftpq - Queued async client for the interactive sftp program
//!
//! sftpq drives a single `sftp` child process and turns its line-oriented
//! console into an async request/response API. Commands from any number of
//! callers are queued and sent one at a time; replies are split out of the
//! output streams by watching for the prompt.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sftpq::{Sftp, SftpConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = SftpConfig::for_host("example.org");
//!     config.username = Some("deploy".to_string());
//!
//!     let sftp = Sftp::new(config)?;
//!     println!("cwd: {}", sftp.pwd().await?);
//!     for entry in sftp.ls("/var/www").await?.entries {
//!         println!("{}", entry);
//!     }
//!     sftp.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! Commands issued before `connect()` are queued and trigger the connection
//! themselves.

pub mod client;
pub mod config;
pub mod connection;
pub mod demux;
pub mod error;
pub mod features;
pub mod keyfile;
pub mod listing;
pub mod logging;
pub mod reply;
pub mod staging;
pub mod stat;
pub mod transport;

// Re-export commonly used types
pub use client::{Sftp, Snapshot};
pub use config::SftpConfig;
pub use connection::{ConnectionEvent, ConnectionState};
pub use error::{ConnectionError, SftpError};
pub use features::{FeatureSource, FeatureTable};
pub use listing::{DirectoryEntry, Listing};
pub use stat::{FileType, Stat};

// vim: ts=4
