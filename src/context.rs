//! Execution context threaded through the job pipeline.
//!
//! Interactive callers render progress and stream logs to a terminal;
//! programmatic callers receive structured results and no incidental output.
//! Components take the mode and sinks explicitly rather than consulting
//! process-wide state.

use std::io::Write;

/// Whether the pipeline is driven by a person at a terminal or by code.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Render progress, tail logs, and print status messages.
    Interactive,
    /// Return structured records only.
    #[default]
    Programmatic,
}

impl ExecutionMode {
    /// Returns `true` for [`ExecutionMode::Interactive`].
    #[must_use]
    pub const fn is_interactive(self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Receives incremental byte counts while a workspace is archived.
pub trait ProgressSink {
    /// Announces the expected total before any bytes are processed.
    fn start(&mut self, total_bytes: u64);

    /// Reports `delta_bytes` newly processed bytes.
    fn advance(&mut self, delta_bytes: u64);

    /// Marks the operation complete.
    fn finish(&mut self);
}

/// Progress sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&mut self, _total_bytes: u64) {}

    fn advance(&mut self, _delta_bytes: u64) {}

    fn finish(&mut self) {}
}

const BAR_WIDTH: u64 = 30;

/// Renders a single-line textual progress bar to a writer.
///
/// The line is redrawn only when the whole-percent value changes.
#[derive(Debug)]
pub struct TextProgress<W: Write> {
    out: W,
    label: String,
    total: u64,
    processed: u64,
    last_percent: Option<u64>,
}

impl<W: Write> TextProgress<W> {
    /// Creates a bar labelled with `label`, drawn onto `out`.
    pub fn new(out: W, label: impl Into<String>) -> Self {
        Self {
            out,
            label: label.into(),
            total: 0,
            processed: 0,
            last_percent: None,
        }
    }

    fn percent(&self) -> u64 {
        self.processed
            .min(self.total)
            .saturating_mul(100)
            .checked_div(self.total)
            .unwrap_or(100)
    }

    fn draw(&mut self) {
        let percent = self.percent();
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        let filled = percent
            .saturating_mul(BAR_WIDTH)
            .checked_div(100)
            .unwrap_or(BAR_WIDTH);
        let bar: String = (0..BAR_WIDTH)
            .map(|cell| if cell < filled { '=' } else { ' ' })
            .collect();
        write!(
            self.out,
            "\r{} [{bar}] {percent:>3}% {}/{} bytes",
            self.label, self.processed, self.total
        )
        .ok();
        self.out.flush().ok();
    }
}

impl<W: Write> ProgressSink for TextProgress<W> {
    fn start(&mut self, total_bytes: u64) {
        self.total = total_bytes;
        self.processed = 0;
        self.last_percent = None;
        self.draw();
    }

    fn advance(&mut self, delta_bytes: u64) {
        self.processed = self.processed.saturating_add(delta_bytes);
        self.draw();
    }

    fn finish(&mut self) {
        self.processed = self.processed.max(self.total);
        self.draw();
        writeln!(self.out).ok();
    }
}

/// Destination for human-readable status messages and remote log lines.
pub trait MessageSink {
    /// Emits a status message produced by the pipeline itself.
    fn status(&mut self, message: &str);

    /// Emits one line of remote job output.
    fn log_line(&mut self, line: &str);
}

/// Message sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn status(&mut self, _message: &str) {}

    fn log_line(&mut self, _line: &str) {}
}

/// Message sink writing status to one stream and log lines to another.
#[derive(Debug)]
pub struct WriterSink<S: Write, L: Write> {
    status: S,
    logs: L,
}

impl<S: Write, L: Write> WriterSink<S, L> {
    /// Creates a sink; status messages go to `status`, job output to `logs`.
    pub const fn new(status: S, logs: L) -> Self {
        Self { status, logs }
    }
}

impl<S: Write, L: Write> MessageSink for WriterSink<S, L> {
    fn status(&mut self, message: &str) {
        writeln!(self.status, "{message}").ok();
    }

    fn log_line(&mut self, line: &str) {
        writeln!(self.logs, "{line}").ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_progress_redraws_on_percent_change_only() {
        let mut bar = TextProgress::new(Vec::new(), "Archiving");
        bar.start(200);
        bar.advance(1);
        bar.advance(1);
        bar.advance(98);
        bar.finish();

        let rendered = String::from_utf8(bar.out).unwrap_or_else(|err| panic!("utf8: {err}"));
        let frames: Vec<&str> = rendered.split('\r').filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 4, "frames: {frames:?}");
        assert!(rendered.contains("  1% 2/200 bytes"), "rendered: {rendered}");
        assert!(rendered.contains(" 50% 100/200 bytes"), "rendered: {rendered}");
        assert!(rendered.ends_with("100% 200/200 bytes\n"), "rendered: {rendered}");
    }

    #[test]
    fn text_progress_handles_empty_total() {
        let mut bar = TextProgress::new(Vec::new(), "Archiving");
        bar.start(0);
        bar.finish();

        let rendered = String::from_utf8(bar.out).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(rendered.contains("100% 0/0 bytes"), "rendered: {rendered}");
    }

    #[test]
    fn writer_sink_separates_status_and_logs() {
        let mut sink = WriterSink::new(Vec::new(), Vec::new());
        sink.status("Job created");
        sink.log_line("epoch 1");

        assert_eq!(sink.status, b"Job created\n");
        assert_eq!(sink.logs, b"epoch 1\n");
    }

    #[test]
    fn execution_mode_defaults_to_programmatic() {
        assert!(!ExecutionMode::default().is_interactive());
        assert!(ExecutionMode::Interactive.is_interactive());
    }
}
