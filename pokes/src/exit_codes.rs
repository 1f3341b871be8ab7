#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// Invalid CLI flags or plan (bad durations, out-of-range rates, unreadable plan, etc.).
    InvalidInput = 30,

    /// The load test or its output failed after the plan was accepted.
    RuntimeError = 40,

    /// Stopped with Ctrl-C; partial results were printed.
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
