//! Where `print`, `echo` and `message` lines go

use std::sync::Arc;

use parking_lot::Mutex;

/// Kind of line a script produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `print` results
    Print,
    /// `echo` text
    Echo,
    /// `message` text, meant for a status line rather than the console
    Message,
    /// Runtime errors reported while `haltOnError` is off
    Error,
}

/// Receiver of script output lines
pub trait OutputSink: Send {
    fn write_line(&mut self, kind: OutputKind, line: &str);
}

/// Output collector that can be cloned and read from another thread
#[derive(Debug, Clone, Default)]
pub struct SharedOutput {
    lines: Arc<Mutex<Vec<(OutputKind, String)>>>,
}

impl SharedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of every line received so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().map(|(_, l)| l.clone()).collect()
    }

    /// Lines of one kind
    pub fn lines_of(&self, kind: OutputKind) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Drain the collected lines
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
            .into_iter()
            .map(|(_, l)| l)
            .collect()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl OutputSink for SharedOutput {
    fn write_line(&mut self, kind: OutputKind, line: &str) {
        self.lines.lock().push((kind, line.to_string()));
    }
}

/// Sink that forwards every line to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOutput;

impl OutputSink for LogOutput {
    fn write_line(&mut self, kind: OutputKind, line: &str) {
        match kind {
            OutputKind::Error => log::error!("{}", line),
            OutputKind::Message => log::debug!("message: {}", line),
            _ => log::info!("{}", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_output_clones_share_lines() {
        let out = SharedOutput::new();
        let mut writer = out.clone();
        writer.write_line(OutputKind::Print, "10");
        writer.write_line(OutputKind::Echo, "hello");
        assert_eq!(out.lines(), ["10", "hello"]);
        assert_eq!(out.lines_of(OutputKind::Echo), ["hello"]);
        assert_eq!(out.take().len(), 2);
        assert!(out.lines().is_empty());
    }
}
