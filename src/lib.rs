//! depot-dl - resumable multi-file game transfers.
//!
//! This library implements both sides of a catalog-based transfer
//! protocol: a server that scans game directories into checksummed
//! catalogs and serves files whole, from byte offsets, or as one
//! boundary-framed continuous stream; and a client that downloads a
//! catalog file by file, persisting per-file progress in a ledger so an
//! interrupted transfer resumes without re-downloading completed bytes.
//!
//! # Example
//!
//! ```no_run
//! use depot_dl::{DepotClient, NoProgress};
//!
//! # async fn example() -> depot_dl::Result<()> {
//! let client = DepotClient::new("http://127.0.0.1:8000", Some("s3cret"))?;
//!
//! // Fetch the catalog, then download (or resume) every file.
//! let catalog = client.fetch_catalog("mygame").await?;
//! println!("{} files, {} bytes", catalog.total_files, catalog.total_size);
//!
//! client
//!     .download_game("mygame", "install".as_ref(), &NoProgress)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod format;
pub mod framing;
pub mod ledger;
pub mod resolve;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(feature = "server")]
pub mod server;

// Re-export main types for convenience
pub use catalog::{CatalogEntry, FileTreeNode, GameCatalog, GameList, GameSummary, StartInfo};
pub use config::{GameConfig, ServerConfig, ServerSettings};
pub use download::{ClientOptions, DepotClient, NoProgress, TransferProgress};
pub use error::{Error, Result};
pub use ledger::{LedgerEntry, TransferLedger};
pub use resolve::{StartPoint, resolve_start};
