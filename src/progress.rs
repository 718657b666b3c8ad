use std::sync::Mutex;
use tracing::info;

/// Sink for the textual status stream produced by scheduled jobs.
///
/// `write` appends without a line break (inline progress ticks such as `.` or `42%... `),
/// `write_line` appends and terminates the current line. Both default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn write(&self, _text: &str) {}
    fn write_line(&self, _text: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Forwards the status stream to the tracing log, one event per completed line.
///
/// Inline fragments are buffered until the next `write_line`, so a run of
/// `Deleting..` followed by chunk ticks and `OK (took 00:03)` lands as a single record.
#[derive(Default)]
pub struct TraceReporter {
    pending: Mutex<String>,
}

impl TraceReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for TraceReporter {
    fn write(&self, text: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.push_str(text);
        }
    }

    fn write_line(&self, text: &str) {
        let line = match self.pending.lock() {
            Ok(mut pending) => {
                pending.push_str(text);
                std::mem::take(&mut *pending)
            }
            Err(_) => text.to_string(),
        };
        info!(target: "lms_cleanup::trace", "{}", line);
    }
}

impl Drop for TraceReporter {
    fn drop(&mut self) {
        if let Ok(pending) = self.pending.get_mut() {
            if !pending.is_empty() {
                info!(target: "lms_cleanup::trace", "{}", pending);
            }
        }
    }
}

/// Captures the status stream in memory. Used by tests and by callers that
/// want to inspect what a job reported.
#[derive(Default)]
pub struct CaptureReporter {
    output: Mutex<String>,
}

impl CaptureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, verbatim.
    pub fn output(&self) -> String {
        self.output
            .lock()
            .map(|output| output.clone())
            .unwrap_or_default()
    }

    /// Completed lines, without their terminators. A trailing partial line is included.
    pub fn lines(&self) -> Vec<String> {
        self.output().lines().map(str::to_string).collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.output().contains(needle)
    }
}

impl ProgressReporter for CaptureReporter {
    fn write(&self, text: &str) {
        if let Ok(mut output) = self.output.lock() {
            output.push_str(text);
        }
    }

    fn write_line(&self, text: &str) {
        if let Ok(mut output) = self.output.lock() {
            output.push_str(text);
            output.push('\n');
        }
    }
}
