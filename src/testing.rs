//! Test helpers

use std::io;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;

/// Log lines written while a [`LogCapture`] is installed
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Install a plain-text subscriber for the current thread
    ///
    /// Events are captured until the returned guard is dropped. Use with a
    /// current-thread runtime so every task logs through it.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_target(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    /// Captured lines so far
    pub fn lines(&self) -> Vec<String> {
        let buf = self.buf.lock().unwrap();
        String::from_utf8_lossy(&buf).lines().map(str::to_string).collect()
    }

    /// Panic unless some captured line contains every fragment
    pub fn assert_line(&self, fragments: &[&str]) {
        let lines = self.lines();
        assert!(
            lines.iter().any(|line| fragments.iter().all(|f| line.contains(f))),
            "no log line contains {:?}; captured:\n{}",
            fragments,
            lines.join("\n")
        );
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
