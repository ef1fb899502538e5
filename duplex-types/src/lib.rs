//! Core type definitions for duplex.
//!
//! This crate defines the fundamental, store-agnostic types used throughout
//! the replication engine:
//! - Document and side identifiers
//! - Opaque store-assigned revisions
//! - Hybrid Logical Clock timestamps
//! - The `Version` snapshot model and the type-erased document envelope
//! - Change-feed records
//!
//! Everything store-specific (revision formats, winner selection, transport)
//! belongs in the store implementations, not here.

mod change;
mod ids;
mod revision;
mod timestamp;
mod version;

pub use change::Change;
pub use ids::{DocumentId, SideId};
pub use revision::Revision;
pub use timestamp::HybridTimestamp;
pub use version::{RawDocument, RawVersion, Version};
