//! Merge algorithms and the build-once merge registry for duplex.
//!
//! When two sides mutate the same document between synchronizations, the
//! engine reduces the resulting conflict set to one winning version with a
//! caller-supplied, per-entity-kind merge algorithm. This crate defines:
//!
//! - [`Replicated`] — the one capability an entity needs: conversion to and
//!   from the store envelope
//! - [`MergeAlgorithm`] — the strongly-typed merge contract (a pure function
//!   of the primary version and the conflict set)
//! - [`ErasedMerge`] — its envelope-level counterpart, used where the
//!   concrete entity type is only known at runtime
//! - [`MergeRegistry`] — a map from entity kind to algorithm, frozen by
//!   [`MergeRegistry::build`] and read without locking afterwards
//! - Stock algorithms: [`LwwDocument`] and [`LwwFields`]
//!
//! Merge execution is synchronous and CPU-only; algorithms must be
//! deterministic so concurrent resolvers on different sides converge.

mod algorithm;
mod entity;
mod error;
mod lww;
mod registry;

pub use algorithm::{erase, merged_timestamp, ErasedMerge, MergeAlgorithm};
pub use entity::{pack, unpack, Replicated};
pub use error::{MergeError, MergeResult};
pub use lww::{LwwDocument, LwwFields};
pub use registry::MergeRegistry;
