//! # murmur-shared
//!
//! Types shared by every Murmur crate: the message data model, the
//! conversation pair, the change-feed events, payload encoding helpers and
//! the async provider contract that the client core is written against.

pub mod constants;
pub mod error;
pub mod payload;
pub mod protocol;
pub mod provider;
pub mod types;

pub use error::{MurmurError, Result};
pub use types::*;
