//! Console progress output

use chrono::NaiveDateTime;
use scadasim_core::progress::{ProgressListener, RunSummary};
use scadasim_core::schema::ColumnLayout;
use std::io::{self, Write};

/// Prints run progress as plain lines
pub struct ConsoleProgress<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleProgress<io::Stdout> {
    /// Print to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleProgress<W> {
    /// Print to any writer
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Get the writer back
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        // write errors are ignored
        let _ = writeln!(self.out, "{}", text);
        let _ = self.out.flush();
    }
}

impl<W: Write> ProgressListener for ConsoleProgress<W> {
    fn on_columns(&mut self, layout: &ColumnLayout) {
        let measures: Vec<&str> = layout.measures.iter().map(|p| p.measure.as_str()).collect();
        let qualities: Vec<&str> = layout.measures.iter().map(|p| p.quality.as_str()).collect();
        self.line(format_args!("Table {}", layout.table));
        self.line(format_args!("Measures: {}", measures.join(", ")));
        self.line(format_args!("Quality columns: {}", qualities.join(", ")));
    }

    fn on_flush(&mut self, rows_so_far: u64, last_timestamp: NaiveDateTime) {
        self.line(format_args!(
            "{} rows inserted (last timestamp {})",
            rows_so_far,
            last_timestamp.format("%Y-%m-%d %H:%M:%S")
        ));
    }

    fn on_complete(&mut self, summary: &RunSummary) {
        let last = summary
            .last_timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        self.line(format_args!(
            "Done: {} rows in {} batches, last timestamp {} ({:.1}s)",
            summary.rows_inserted,
            summary.batches,
            last,
            summary.elapsed.as_secs_f64()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use scadasim_core::schema::MeasurePair;
    use std::time::Duration;

    fn ts(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn output(progress: ConsoleProgress<Vec<u8>>) -> String {
        String::from_utf8(progress.into_inner()).unwrap()
    }

    #[test]
    fn test_flush_line() {
        let mut progress = ConsoleProgress::new(Vec::new());
        progress.on_flush(1000, ts(16));
        assert_eq!(
            output(progress),
            "1000 rows inserted (last timestamp 2024-01-01 16:00:00)\n"
        );
    }

    #[test]
    fn test_columns_lines() {
        let layout = ColumnLayout {
            table: "ANA".into(),
            timestamp: "UTCTimestamp_Ticks".into(),
            log_type: "LogType".into(),
            not_sync: "NotSync".into(),
            measures: vec![
                MeasurePair {
                    measure: "A".into(),
                    quality: "_A_Q".into(),
                },
                MeasurePair {
                    measure: "B".into(),
                    quality: "_B_Q".into(),
                },
            ],
        };

        let mut progress = ConsoleProgress::new(Vec::new());
        progress.on_columns(&layout);
        assert_eq!(
            output(progress),
            "Table ANA\nMeasures: A, B\nQuality columns: _A_Q, _B_Q\n"
        );
    }

    #[test]
    fn test_complete_line() {
        let summary = RunSummary {
            table: "ANA".into(),
            rows_inserted: 24,
            batches: 1,
            first_timestamp: Some(ts(0)),
            last_timestamp: Some(ts(23)),
            elapsed: Duration::from_millis(1500),
            insert_stats: Default::default(),
        };

        let mut progress = ConsoleProgress::new(Vec::new());
        progress.on_complete(&summary);
        assert_eq!(
            output(progress),
            "Done: 24 rows in 1 batches, last timestamp 2024-01-01 23:00:00 (1.5s)\n"
        );
    }
}
