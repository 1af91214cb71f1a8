//! deltavault - chain-based incremental backup over delta synchronization
//!
//! Updating a file from an old version to a new one takes three passes:
//! summarize the old version into a [`signature::Signature`], stream the new
//! version against it to produce a delta ([`delta::spawn_delta`]), and apply
//! that delta to the old bytes to rebuild the new ones ([`patch::apply`]).
//! Only the signature and the delta ever travel between nodes. The
//! [`backup`] module composes these passes into full and incremental
//! snapshots and restores arbitrary-length chains.

pub mod backup;
pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod patch;
pub mod rolling;
pub mod signature;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use rolling::BLOCK_SIZE;
