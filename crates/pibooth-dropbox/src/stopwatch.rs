use std::time::Instant;
use tracing::info;

/// Logs how long a transfer took when dropped
pub struct Stopwatch {
    message: String,
    bytes: usize,
    started: Instant,
}

impl Stopwatch {
    pub fn start(message: impl Into<String>, bytes: usize) -> Self {
        Self {
            message: message.into(),
            bytes,
            started: Instant::now(),
        }
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed();
        info!(
            bytes = self.bytes,
            elapsed_ms = elapsed.as_millis() as u64,
            "Total elapsed time for {}: {:.3}s",
            self.message,
            elapsed.as_secs_f64()
        );
    }
}
