// Console frontend - renders run events as terminal lines

use crate::models::RunOutcome;
use crate::ui::bridge::EventSink;
use std::io::Write;

/// Writes run events to a terminal (or any writer)
///
/// Record fields are printed as `Display name: value`; a progress line follows
/// every completed region.
pub struct ConsoleSink<W: Write + Send + 'static> {
    out: W,
    fields_shown: usize,
    regions_completed: usize,
    outcome: Option<RunOutcome>,
}

impl<W: Write + Send + 'static> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            fields_shown: 0,
            regions_completed: 0,
            outcome: None,
        }
    }

    fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            tracing::debug!("Console write failed: {}", e);
        }
    }

    pub fn fields_shown(&self) -> usize {
        self.fields_shown
    }

    pub fn regions_completed(&self) -> usize {
        self.regions_completed
    }

    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> EventSink for ConsoleSink<W> {
    fn on_log(&mut self, text: &str) {
        let stamp = chrono::Local::now().format("%H:%M:%S");
        self.line(&format!("{} | {}", stamp, text));
    }

    fn on_record_displayed(&mut self, field: &str, value: &str) {
        self.fields_shown += 1;
        self.line(&format!("    {}: {}", field, value));
    }

    fn on_region_completed(&mut self, region: &str) {
        self.regions_completed += 1;
        self.line(&format!("--- {} complete ---", region));
    }

    fn on_progress(&mut self, completed: usize, total: usize, percent: f64) {
        self.line(&format!("Progress: {}/{} ({:.1}%)", completed, total, percent));
    }

    fn on_warning(&mut self, text: &str) {
        self.line(&format!("WARNING: {}", text));
    }

    fn on_run_finished(&mut self, outcome: RunOutcome) {
        self.outcome = Some(outcome);
        self.line(&format!("Run finished: {}", outcome));
        let _ = self.out.flush();
    }
}

/// Interactive command typed while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Cancel,
}

impl ConsoleCommand {
    /// Parse one input line (`p`/`pause`, `r`/`resume`, `c`/`cancel`/`q`)
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(ConsoleCommand::Pause),
            "r" | "resume" => Some(ConsoleCommand::Resume),
            "c" | "cancel" | "q" | "quit" => Some(ConsoleCommand::Cancel),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(sink: ConsoleSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_record_and_progress_lines() {
        let mut sink = ConsoleSink::new(Vec::new());

        sink.on_record_displayed("Name", "City Museum");
        sink.on_region_completed("Springfield");
        sink.on_progress(1, 4, 25.0);
        sink.on_warning("Region code not found for X, skipping");
        sink.on_run_finished(RunOutcome::Cancelled);

        assert_eq!(sink.fields_shown(), 1);
        assert_eq!(sink.regions_completed(), 1);
        assert_eq!(sink.outcome(), Some(RunOutcome::Cancelled));

        let text = output(sink);
        assert!(text.contains("    Name: City Museum\n"));
        assert!(text.contains("--- Springfield complete ---"));
        assert!(text.contains("Progress: 1/4 (25.0%)"));
        assert!(text.contains("WARNING: Region code not found for X"));
        assert!(text.contains("Run finished: cancelled by user"));
    }

    #[test]
    fn test_log_lines_are_timestamped() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.on_log("Querying Springfield (170100)");

        let text = output(sink);
        assert!(text.ends_with(" | Querying Springfield (170100)\n"));
        assert_eq!(text.find(" | "), Some(8));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("p"), Some(ConsoleCommand::Pause));
        assert_eq!(ConsoleCommand::parse(" Resume \n"), Some(ConsoleCommand::Resume));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Cancel));
        assert_eq!(ConsoleCommand::parse("status"), None);
    }
}
