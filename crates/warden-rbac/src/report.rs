//! Structured conformance report stream.
//!
//! One line per decorated test, written to a dedicated file distinct from the
//! tracing stream. Field order and separators are identical across runs so
//! downstream tooling can diff reports.
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// A prediction or observation rendered for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Denied,
}

impl Verdict {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed { Verdict::Allowed } else { Verdict::Denied }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Allowed => f.write_str("Allowed"),
            Verdict::Denied => f.write_str("Denied"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub service: String,
    pub test: String,
    pub rule: String,
    pub expected: Verdict,
    pub actual: Verdict,
}

impl ReportRow {
    fn render(&self) -> String {
        format!(
            "service: {}, test: {}, rule: {}, expected: {}, actual: {}",
            self.service, self.test, self.rule, self.expected, self.actual
        )
    }
}

/// Append-only report writer.
#[derive(Debug)]
pub struct RbacReporter {
    writer: Mutex<BufWriter<File>>,
}

impl RbacReporter {
    pub fn open(dir: &Path, file_name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(file_name))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn record(&self, row: &ReportRow) -> io::Result<()> {
        let mut writer = self.writer.lock().expect("report writer poisoned");
        writeln!(writer, "{}", row.render())?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_display() {
        assert_eq!(Verdict::Allowed.to_string(), "Allowed");
        assert_eq!(Verdict::Denied.to_string(), "Denied");
        assert_eq!(Verdict::from_allowed(true), Verdict::Allowed);
        assert_eq!(Verdict::from_allowed(false), Verdict::Denied);
    }

    #[test]
    fn row_render_is_stable() {
        let row = ReportRow {
            service: "compute".to_string(),
            test: "test_create_server".to_string(),
            rule: "create_server".to_string(),
            expected: Verdict::Allowed,
            actual: Verdict::Denied,
        };
        assert_eq!(
            row.render(),
            "service: compute, test: test_create_server, rule: create_server, expected: Allowed, actual: Denied"
        );
    }

    #[test]
    fn record_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reporter = RbacReporter::open(dir.path(), "report.log").expect("open");
        let row = ReportRow {
            service: "compute".to_string(),
            test: "t1".to_string(),
            rule: "r1".to_string(),
            expected: Verdict::Denied,
            actual: Verdict::Denied,
        };
        reporter.record(&row).expect("record");
        reporter.record(&row).expect("record");

        let contents = fs::read_to_string(dir.path().join("report.log")).expect("read");
        assert_eq!(contents.lines().count(), 2);
    }
}
