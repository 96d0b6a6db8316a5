#![deny(unsafe_code)]

//! # Overview
//!
//! `cdump_core` is the shared foundation for every crate in the cache
//! dumper workspace: the options surface (`DumperOptions`), the error kinds
//! that cross task boundaries as plain `Result` values (never panics or
//! unwinding), the wire-adjacent data model (`InventoryRecord`, `McData`),
//! the process exit code mapping, and the small self-contained URL-decoder
//! used to decode `key=` tokens from the metadump stream.
//!
//! Nothing in this crate talks to a socket or touches the filesystem; it is
//! pure data and pure functions so every other crate can depend on it
//! without pulling in I/O.

pub mod error;
pub mod exit_code;
pub mod model;
pub mod options;
pub mod urlencode;

pub use error::{DumperError, DumperResult};
pub use exit_code::ExitCode;
pub use model::{InventoryRecord, McData};
pub use options::DumperOptions;
