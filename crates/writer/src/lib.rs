#![deny(unsafe_code)]

//! # Key/Value Writer (C5)
//!
//! Batches inventory keys into `get` commands, drains the server's bulk-get
//! reply through [`cdump_protocol::BulkGetParser`], and writes completed
//! records to a [`cdump_sink::DataFileSink`]. A batch closes when it hits
//! `bulk_get_threshold` keys, or when the sum of metadump-reported value
//! sizes (plus a fixed per-key wire overhead) would exceed the available
//! chunk headroom — whichever comes first, so one batch's reply can never
//! overrun a pooled buffer regardless of how small `bulk_get_threshold` is
//! set relative to average value size.

use std::collections::HashMap;
use std::io::{Read, Write};

use cdump_core::{InventoryRecord, McData};
use cdump_protocol::{BulkGetEvent, BulkGetParser, ProtocolError};
use cdump_sink::{DataFileSink, SinkError};
use cdump_socket::PooledSocket;
use thiserror::Error;

/// Estimated per-key wire overhead for a `VALUE <key> <flags> <bytes>\r\n`
/// header plus its trailing `\r\n`, used only to decide when a batch has
/// grown large enough to flush.
const KEY_HEADER_OVERHEAD: u64 = 32;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("I/O error talking to the cache server: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a single flush: how many keys were satisfied vs. missing from
/// the reply (§8 scenario 4 — a key can legitimately evict between the
/// metadump snapshot and the bulk get), plus any data files the sink closed
/// out mid-flush (§4.8: a batch can rotate the sink more than once when its
/// total reply size crosses `max_data_file_size`, and every closed file
/// needs its own upload task, not just the run's final one).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub satisfied: usize,
    pub missing: usize,
    pub rotated_files: Vec<std::path::PathBuf>,
}

/// Batches keys from the inventory stream into `get` commands and writes
/// their values out.
pub struct KeyValueWriter {
    bulk_get_threshold: u32,
    byte_ceiling: u64,
    pending: HashMap<String, PendingEntry>,
    order: Vec<String>,
    estimated_bytes: u64,
    read_buf: Vec<u8>,
}

struct PendingEntry {
    expiry: i64,
}

impl KeyValueWriter {
    /// `byte_ceiling` is the headroom-adjusted chunk size a single reply
    /// must stay under (Open Question (a): `chunk_size - headroom`).
    pub fn new(bulk_get_threshold: u32, byte_ceiling: u64, read_buf_capacity: usize) -> KeyValueWriter {
        KeyValueWriter {
            bulk_get_threshold,
            byte_ceiling,
            pending: HashMap::new(),
            order: Vec::new(),
            estimated_bytes: 0,
            read_buf: vec![0u8; read_buf_capacity],
        }
    }

    /// Queues one inventory record's key, flushing first if adding it would
    /// cross a batch boundary.
    pub fn process_key(
        &mut self,
        record: &InventoryRecord,
        socket: &mut PooledSocket,
        sink: &mut DataFileSink,
    ) -> Result<Option<FlushStats>, WriterError> {
        let mut stats = None;
        if self.would_overflow(record) {
            stats = Some(self.flush_pending(socket, sink)?);
        }
        let key = record.decoded_key();
        self.estimated_bytes += record.size + KEY_HEADER_OVERHEAD;
        self.pending.insert(key.clone(), PendingEntry { expiry: record.expiry });
        self.order.push(key);
        Ok(stats)
    }

    fn would_overflow(&self, next: &InventoryRecord) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        self.order.len() as u32 >= self.bulk_get_threshold
            || self.estimated_bytes + next.size + KEY_HEADER_OVERHEAD > self.byte_ceiling
    }

    /// Sends a `get` command for every pending key and writes out whatever
    /// values come back, returning how many keys were satisfied vs. missing.
    pub fn flush_pending(
        &mut self,
        socket: &mut PooledSocket,
        sink: &mut DataFileSink,
    ) -> Result<FlushStats, WriterError> {
        if self.order.is_empty() {
            return Ok(FlushStats::default());
        }

        let command = build_get_command(&self.order);
        socket.stream_mut().write_all(command.as_bytes())?;

        let mut parser = BulkGetParser::new();
        let mut satisfied = 0usize;
        let mut rotated_files = Vec::new();
        loop {
            let n = socket.stream_mut().read(&mut self.read_buf)?;
            let events = parser.feed(&self.read_buf[..n])?;
            let mut done = false;
            for event in events {
                match event {
                    BulkGetEvent::Value { key, flags, data } => {
                        if let Some(entry) = self.pending.remove(&key) {
                            let record = McData {
                                key,
                                expiry: entry.expiry,
                                flags,
                                size: data.len() as u64,
                                value: data,
                                complete: true,
                            };
                            if let Some(rotated) = sink.write_record(&record)? {
                                rotated_files.push(rotated);
                            }
                            satisfied += 1;
                        }
                    }
                    BulkGetEvent::End => done = true,
                }
            }
            if done || n == 0 {
                break;
            }
        }
        parser.finish()?;

        let missing = self.pending.len();
        let stats = FlushStats { satisfied, missing, rotated_files };
        self.pending.clear();
        self.order.clear();
        self.estimated_bytes = 0;
        Ok(stats)
    }

    pub fn pending_len(&self) -> usize {
        self.order.len()
    }
}

fn build_get_command(keys: &[String]) -> String {
    let mut cmd = String::from("get");
    for key in keys {
        cmd.push(' ');
        cmd.push_str(key);
    }
    cmd.push_str("\r\n");
    cmd
}
