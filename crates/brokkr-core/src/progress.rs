//! Progress reporting for long-running registry operations

/// Receives progress from a scan/update pass.
///
/// The registry calls this synchronously from its own thread; slow
/// implementations slow the pass down.
pub trait ProgressMonitor {
    /// Total number of work steps for the pass, when known
    fn set_total(&mut self, _total: usize) {}

    /// One unit of work finished
    fn step(&mut self, _message: &str) {}

    /// Informational output
    fn log(&mut self, _message: &str) {}

    /// Non-fatal problem the user should see
    fn warn(&mut self, _message: &str) {}
}

/// Progress monitor that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressMonitor for SilentProgress {}

/// Progress monitor that accumulates messages, mainly for tests and the
/// isolation worker's host-side relay
#[derive(Debug, Default)]
pub struct RecordingProgress {
    /// Collected warnings
    pub warnings: Vec<String>,
    /// Collected log lines
    pub logs: Vec<String>,
    /// Steps taken
    pub steps: usize,
}

impl ProgressMonitor for RecordingProgress {
    fn step(&mut self, _message: &str) {
        self.steps += 1;
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}
