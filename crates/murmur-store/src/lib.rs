//! # murmur-store
//!
//! Embedded reference provider for the Murmur messaging core, backed by
//! SQLite.
//!
//! [`LocalBackend`] implements every trait of
//! [`murmur_shared::provider`]: a signed-in session, the profile
//! directory, message persistence with the sender-only delete constraint,
//! an in-process realtime change feed and a content-addressed blob store.
//! The synchronous [`Database`] handle underneath exposes typed CRUD
//! helpers for each table.

pub mod backend;
pub mod blobs;
pub mod database;
pub mod feed;
pub mod messages;
pub mod migrations;
pub mod profiles;

mod error;

pub use backend::{LocalBackend, LocalSession};
pub use blobs::StoredBlob;
pub use database::Database;
pub use error::StoreError;
pub use feed::ChangeBus;
pub use profiles::NewProfile;
