//! Opsdesk Core - Shared gallery types.
//!
//! This crate provides the types shared by the gallery manager, its remote
//! store adapters, and the operator CLI:
//! - `gallery` - Gallery image manager and remote store adapters
//! - `cli` - Operator command-line tool
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no async.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, gallery owners, image records, and media classification

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
