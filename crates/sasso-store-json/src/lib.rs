//! JSON-document backend for the Sasso idempotency store.
//!
//! The whole ledger lives in one file, rewritten through a temporary sibling
//! and an atomic rename on every mutation, so a reader never observes a
//! partial write.

mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::JsonFileStore;
