//! Library orchestration for mangopeach.
//!
//! [`LibraryManager`] ties the pieces together:
//!
//! - **Registration** - configured libraries are resolved to persistent
//!   records by durable directory handle, then by path
//! - **Rescans** - full scans for new libraries, scan-and-compare for known
//!   ones, with a per-library "recently deleted" list
//! - **Bundle reads** - page listings and page bytes routed to the scanner of
//!   the library that owns the bundle
//! - **Scheduling** - periodic rescans at human-readable intervals
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use mangopeach_core::{LibraryConfig, MemoryLibraryStore, ScanConfig};
//! use mangopeach_library::LibraryManager;
//! use mangopeach_scan::ProviderRegistry;
//!
//! let manager = Arc::new(LibraryManager::new(
//!     Arc::new(MemoryLibraryStore::new()),
//!     ProviderRegistry::with_defaults(),
//!     ScanConfig::default(),
//! )?);
//!
//! let configs = vec![LibraryConfig::local("Comics", "/srv/comics").with_scan_interval("1h")];
//! manager.initialize(&configs).await;
//! manager.schedule_scans().await?;
//!
//! // ... later
//! manager.shutdown();
//! ```

mod manager;
mod scheduler;

pub use manager::LibraryManager;
pub use scheduler::{JobRun, ScheduledJob, Scheduler, parse_interval};
