//! Metadump sub-machine: `READ_LINE` -> `LINE_OR_END`, detecting the
//! terminal `END\r\n` marker across arbitrary chunk boundaries.
//!
//! Rather than re-parsing every inventory line (the File Sink already finds
//! record boundaries on the raw byte stream), this scanner's only job is to
//! tell the Metadump Task when it has seen the terminator, while never
//! letting the terminator bytes themselves leak into the bytes handed to
//! the sink (end-to-end scenario 3: a trailing `END\r\n` must not land in
//! any inventory file).
//!
//! It does this the way a streaming string search has to: withhold the
//! longest suffix of what it has seen so far that could still be a prefix
//! of `END\r\n`, and only release those bytes once a following chunk proves
//! they were not actually part of the terminator.

const TERMINATOR: &[u8] = b"END\r\n";

/// Result of feeding one chunk to a [`MetadumpScanner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadumpFeedResult {
    /// Bytes safe to forward to the File Sink now.
    pub to_write: Vec<u8>,
    /// True once the terminator has been fully observed.
    pub terminated: bool,
}

/// Restartable scanner carrying only the handful of bytes that might be a
/// partial terminator between calls.
#[derive(Default)]
pub struct MetadumpScanner {
    pending: Vec<u8>,
    terminated: bool,
}

impl MetadumpScanner {
    pub fn new() -> MetadumpScanner {
        MetadumpScanner::default()
    }

    /// Feeds the next chunk of the metadump stream.
    pub fn feed(&mut self, chunk: &[u8]) -> MetadumpFeedResult {
        if self.terminated {
            return MetadumpFeedResult { to_write: Vec::new(), terminated: true };
        }
        let mut combined = std::mem::take(&mut self.pending);
        combined.extend_from_slice(chunk);

        if let Some(idx) = find_subslice(&combined, TERMINATOR) {
            self.terminated = true;
            combined.truncate(idx);
            return MetadumpFeedResult { to_write: combined, terminated: true };
        }

        let withhold = longest_partial_match(&combined, TERMINATOR);
        let split = combined.len() - withhold;
        self.pending = combined[split..].to_vec();
        combined.truncate(split);
        MetadumpFeedResult { to_write: combined, terminated: false }
    }

    /// Call at end of stream. Returns any withheld bytes (which were never
    /// confirmed to be, nor ruled out as, part of the terminator) — a
    /// caller that reaches EOS without `terminated()` having gone true
    /// should treat this as a framing error per §4.4, after writing
    /// whatever this returns.
    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    pub fn terminated(&self) -> bool {
        self.terminated
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Longest suffix of `buf` that is also a proper prefix of `pattern`
/// (never the whole pattern, since a full match is handled by
/// `find_subslice` first).
fn longest_partial_match(buf: &[u8], pattern: &[u8]) -> usize {
    let max_len = pattern.len() - 1;
    for len in (1..=max_len.min(buf.len())).rev() {
        if buf[buf.len() - len..] == pattern[..len] {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_whole(input: &[u8]) -> (Vec<u8>, bool) {
        let mut scanner = MetadumpScanner::new();
        let result = scanner.feed(input);
        let mut out = result.to_write;
        if !result.terminated {
            out.extend(scanner.finish());
        }
        (out, result.terminated)
    }

    fn run_split(input: &[u8], split_at: usize) -> (Vec<u8>, bool) {
        let mut scanner = MetadumpScanner::new();
        let mut out = Vec::new();
        let r1 = scanner.feed(&input[..split_at]);
        out.extend(r1.to_write);
        let mut terminated = r1.terminated;
        if !terminated {
            let r2 = scanner.feed(&input[split_at..]);
            out.extend(r2.to_write);
            terminated = r2.terminated;
        }
        if !terminated {
            out.extend(scanner.finish());
        }
        (out, terminated)
    }

    #[test]
    fn detects_terminator_in_one_chunk() {
        let input = b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\nEND\r\n";
        let (written, terminated) = run_whole(input);
        assert!(terminated);
        assert_eq!(written, b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\n");
    }

    #[test]
    fn detects_terminator_straddling_chunks_en_d() {
        // Scenario 3: chunk ends with "EN", next starts with "D\r\n".
        let input = b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\nEND\r\n";
        let split_at = input.len() - 3; // leaves "EN" at end of first chunk
        let (written, terminated) = run_split(input, split_at);
        assert!(terminated);
        assert_eq!(written, b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\n");
    }

    #[test]
    fn p1_restart_matches_whole_parse_for_every_split_point() {
        let input = b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\n\
key=b exp=100 la=2 cas=2 fetch=yes cls=2 size=2\nEND\r\n";
        let (whole_out, whole_term) = run_whole(input);
        for split_at in 0..=input.len() {
            let (split_out, split_term) = run_split(input, split_at);
            assert_eq!(split_out, whole_out, "mismatch at split {split_at}");
            assert_eq!(split_term, whole_term, "termination mismatch at split {split_at}");
        }
    }

    #[test]
    fn missing_terminator_leaves_scanner_unterminated() {
        let mut scanner = MetadumpScanner::new();
        let result = scanner.feed(b"key=a exp=-1 la=1 cas=1 fetch=no cls=1 size=1\n");
        assert!(!result.terminated);
        assert!(!scanner.terminated());
    }
}
