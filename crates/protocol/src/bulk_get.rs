//! Bulk-get sub-machine: `EXPECT_HEADER` -> `EXPECT_VALUE` -> `EXPECT_CRLF`
//! -> back to `EXPECT_HEADER`, with a terminal transition to `DONE` on
//! `END\r\n` at header position.
//!
//! The parser is restartable: everything it needs to resume mid-record
//! (the current key, how many value bytes remain, any partial header text)
//! lives in `self`, so `feed` can be called with however the caller's
//! socket reads happened to chunk the stream.

use crate::error::ProtocolError;

/// One parsed bulk-get reply event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkGetEvent {
    /// A complete `VALUE <key> <flags> <bytes>\r\n<data>\r\n` record.
    Value { key: String, flags: u32, data: Vec<u8> },
    /// The terminal `END\r\n` at header position.
    End,
}

enum Mode {
    Header,
    Value { key: String, flags: u32, remaining: usize, data: Vec<u8> },
    Crlf { key: String, flags: u32, data: Vec<u8> },
    Done,
}

/// Restartable parser for one `get`/`gets` reply stream.
pub struct BulkGetParser {
    mode: Mode,
    carry: Vec<u8>,
}

impl Default for BulkGetParser {
    fn default() -> Self {
        BulkGetParser { mode: Mode::Header, carry: Vec::new() }
    }
}

impl BulkGetParser {
    pub fn new() -> BulkGetParser {
        BulkGetParser::default()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.mode, Mode::Done)
    }

    /// Feeds the next chunk of bytes, returning every event that became
    /// complete as a result.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<BulkGetEvent>, ProtocolError> {
        self.carry.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            match std::mem::replace(&mut self.mode, Mode::Done) {
                Mode::Done => {
                    self.mode = Mode::Done;
                    break;
                }
                Mode::Header => {
                    let Some(idx) = find_subslice(&self.carry, b"\r\n") else {
                        self.mode = Mode::Header;
                        break;
                    };
                    let line: Vec<u8> = self.carry.drain(..idx + 2).collect();
                    let line = &line[..line.len() - 2];
                    if line == b"END" {
                        events.push(BulkGetEvent::End);
                        self.mode = Mode::Done;
                        break;
                    }
                    let (key, flags, bytes) = parse_value_header(line)?;
                    self.mode = Mode::Value { key, flags, remaining: bytes, data: Vec::with_capacity(bytes) };
                }
                Mode::Value { key, flags, mut remaining, mut data } => {
                    let take = remaining.min(self.carry.len());
                    data.extend(self.carry.drain(..take));
                    remaining -= take;
                    if remaining == 0 {
                        self.mode = Mode::Crlf { key, flags, data };
                    } else {
                        self.mode = Mode::Value { key, flags, remaining, data };
                        break;
                    }
                }
                Mode::Crlf { key, flags, data } => {
                    if self.carry.len() < 2 {
                        self.mode = Mode::Crlf { key, flags, data };
                        break;
                    }
                    if &self.carry[..2] != b"\r\n" {
                        return Err(ProtocolError::MissingValueCrlf);
                    }
                    self.carry.drain(..2);
                    events.push(BulkGetEvent::Value { key, flags, data });
                    self.mode = Mode::Header;
                }
            }
        }
        Ok(events)
    }

    /// Call at end of stream (socket EOF). Returns an error if the parser
    /// was not in a terminal `DONE` state, per §4.4's "missing END at EOS"
    /// rule.
    pub fn finish(&self) -> Result<(), ProtocolError> {
        if self.is_done() {
            Ok(())
        } else {
            Err(ProtocolError::MissingEndAtEos)
        }
    }
}

fn parse_value_header(line: &[u8]) -> Result<(String, u32, usize), ProtocolError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ProtocolError::MalformedHeader("non-UTF-8 header".to_string()))?;
    let tokens: Vec<&str> = text.split_ascii_whitespace().collect();
    if tokens.len() < 4 || tokens.len() > 5 || tokens[0] != "VALUE" {
        return Err(ProtocolError::MalformedHeader(format!("unexpected token count/shape: {text:?}")));
    }
    let key = tokens[1].to_string();
    let flags: u32 = tokens[2]
        .parse()
        .map_err(|_| ProtocolError::MalformedHeader(format!("non-numeric flags: {:?}", tokens[2])))?;
    let bytes: usize = tokens[3]
        .parse()
        .map_err(|_| ProtocolError::MalformedHeader(format!("non-numeric byte count: {:?}", tokens[3])))?;
    Ok((key, flags, bytes))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
