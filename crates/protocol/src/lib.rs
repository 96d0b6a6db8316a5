#![deny(unsafe_code)]

//! # Response Parser (C4)
//!
//! Two restartable sub-machines over the cache server's text protocol:
//! [`metadump`] tracks the `END\r\n` terminal marker across the
//! `lru_crawler metadump all` stream without otherwise reinterpreting the
//! bytes (the File Sink does the record-boundary splitting on the raw
//! stream); [`bulk_get`] parses `VALUE ... \r\n<data>\r\n` replies to a
//! `get` command into structured events.
//!
//! Both machines are restartable: their persistent state is small and
//! explicit, so feeding the same byte stream in arbitrarily many pieces
//! produces the same event sequence as feeding it whole (P1).

pub mod bulk_get;
pub mod error;
pub mod metadump;

pub use bulk_get::{BulkGetEvent, BulkGetParser};
pub use error::ProtocolError;
pub use metadump::MetadumpScanner;
