//! # ats
//!
//! Asset service of the automation task server: named, structured JSON
//! documents with soft delete, served over HTTP and usable as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ats::server::{AppState, create_router};
//! use ats::store::SqliteStore;
//!
//! let store = SqliteStore::new("./data/ats.db").unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store)));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `ats` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
