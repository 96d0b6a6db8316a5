//! Process exit codes.
//!
//! The dumper's exit status is 0 iff every submitted task completed without
//! a task-fatal error (spec §7); anything else maps to a small, stable set
//! of non-zero codes so wrapper scripts can distinguish configuration
//! mistakes from partial runtime failures.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Every submitted task completed without a task-fatal error.
    Ok = 0,
    /// Bad CLI arguments or options that failed startup validation.
    Usage = 1,
    /// One or more tasks failed (task-fatal); partial output was preserved.
    PartialFailure = 2,
    /// A process-fatal error aborted the run before or during dumping.
    Fatal = 3,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_documented_values() {
        assert_eq!(ExitCode::Ok.as_i32(), 0);
        assert_eq!(ExitCode::Usage.as_i32(), 1);
        assert_eq!(ExitCode::PartialFailure.as_i32(), 2);
        assert_eq!(ExitCode::Fatal.as_i32(), 3);
    }
}
