#![deny(unsafe_code)]

//! # Engine: Metadump Task, Process-Metabuf Task, filters, and the
//! coordinator (C7, C8, C9)
//!
//! [`coordinator::run`] is the whole run's entry point: it wires the
//! buffer/socket pools and the scheduler from [`cdump_core::DumperOptions`],
//! submits the single initial [`MetadumpTask`], and waits for everything it
//! (transitively, via re-entrant submission) spawns to finish.

pub mod coordinator;
pub mod error;
pub mod filters;
pub mod metadump_task;
pub mod process_metabuf_task;
pub mod shared;
pub mod upload_task;

pub use coordinator::{run, run_with_metrics};
pub use error::EngineError;
pub use filters::IpShardResolver;
pub use metadump_task::MetadumpTask;
pub use process_metabuf_task::ProcessMetabufTask;
pub use shared::EngineShared;
