//! File log sinks implementing the CSV/NDJSON contract from the external
//! interface spec: an exact CSV header that is repaired in place if stale,
//! and NDJSON lines that carry a `StatusCode` field only when the event has
//! one.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde_json::{Map, json};

/// The exact header every CSV log file must start with.
pub const CSV_HEADER: &str = "Timestamp,Level,Message,Category,Exception,StatusCode";

/// A single structured log line destined for a file sink.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub category: String,
    pub exception: Option<String>,
    pub status_code: Option<u16>,
}

/// A destination for structured log events.
pub trait LogSink: Send {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()>;
}

/// CSV sink. Guarantees the file's first line is always [`CSV_HEADER`],
/// replacing a stale header line in place rather than duplicating it.
pub struct CsvSink {
    file: File,
}

impl CsvSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if existed {
            Self::repair_header(&mut file)?;
        } else {
            writeln!(file, "{CSV_HEADER}")?;
        }

        file.seek(SeekFrom::End(0))?;
        Ok(Self { file })
    }

    /// Rewrite the file so its first line is exactly [`CSV_HEADER`],
    /// preserving every line after it untouched.
    fn repair_header(file: &mut File) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let mut parts = contents.splitn(2, '\n');
        let first_line = parts.next().unwrap_or("").trim_end_matches('\r');
        let rest = parts.next().unwrap_or("");

        if first_line == CSV_HEADER {
            return Ok(());
        }

        let rebuilt = if rest.is_empty() {
            format!("{CSV_HEADER}\n")
        } else {
            format!("{CSV_HEADER}\n{rest}")
        };

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(rebuilt.as_bytes())?;
        Ok(())
    }
}

impl LogSink for CsvSink {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()> {
        let line = format!(
            "{},{},{},{},{},{}\n",
            csv_field(&event.timestamp),
            csv_field(&event.level),
            csv_field(&event.message),
            csv_field(&event.category),
            csv_field(event.exception.as_deref().unwrap_or("")),
            event
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_default(),
        );
        self.file.write_all(line.as_bytes())
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// NDJSON sink. `StatusCode` is omitted entirely from a line rather than
/// written as `null` when the event has no status.
pub struct NdjsonSink {
    file: File,
}

impl NdjsonSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl LogSink for NdjsonSink {
    fn write_event(&mut self, event: &LogEvent) -> io::Result<()> {
        let mut obj = Map::new();
        obj.insert("Timestamp".into(), json!(event.timestamp));
        obj.insert("Level".into(), json!(event.level));
        obj.insert("Message".into(), json!(event.message));
        obj.insert("Category".into(), json!(event.category));
        if let Some(exception) = &event.exception {
            obj.insert("Exception".into(), json!(exception));
        }
        if let Some(status) = event.status_code {
            obj.insert("StatusCode".into(), json!(status));
        }
        let line = serde_json::to_string(&obj)?;
        writeln!(self.file, "{line}")
    }
}

/// File sink format, selected via `GlobalConfig.logging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Csv,
    Ndjson,
}

/// Open the configured sink for a log file path.
pub fn open_sink(path: &Path, format: LogFormat) -> io::Result<Box<dyn LogSink>> {
    match format {
        LogFormat::Csv => Ok(Box::new(CsvSink::open(path)?)),
        LogFormat::Ndjson => Ok(Box::new(NdjsonSink::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn sample_event(status: Option<u16>) -> LogEvent {
        LogEvent {
            timestamp: "2026-07-28T00:00:00Z".into(),
            level: "Info".into(),
            message: "posted file".into(),
            category: "sender".into(),
            exception: None,
            status_code: status,
        }
    }

    #[test]
    fn csv_sink_writes_header_on_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_event(&sample_event(Some(200))).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), CSV_HEADER);
        assert!(lines.next().unwrap().ends_with(",200"));
    }

    #[test]
    fn csv_sink_repairs_stale_header_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "Time,Level,Msg\nold,data,row\n").unwrap();

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_event(&sample_event(None)).unwrap();
        drop(sink);

        let file = std::fs::File::open(&path).unwrap();
        let mut lines = std::io::BufReader::new(file).lines();
        assert_eq!(lines.next().unwrap().unwrap(), CSV_HEADER);
        assert_eq!(lines.next().unwrap().unwrap(), "old,data,row");
        assert!(lines.next().unwrap().unwrap().ends_with(','));
    }

    #[test]
    fn csv_sink_escapes_commas_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        let mut event = sample_event(None);
        event.message = "has, a comma and \"quote\"".into();
        sink.write_event(&event).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"has, a comma and \"\"quote\"\"\""));
    }

    #[test]
    fn ndjson_sink_omits_status_code_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.ndjson");
        let mut sink = NdjsonSink::open(&path).unwrap();
        sink.write_event(&sample_event(None)).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert!(value.get("StatusCode").is_none());
    }

    #[test]
    fn ndjson_sink_includes_status_code_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.ndjson");
        let mut sink = NdjsonSink::open(&path).unwrap();
        sink.write_event(&sample_event(Some(503))).unwrap();
        drop(sink);

        let contents = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        assert_eq!(value.get("StatusCode").unwrap(), 503);
    }
}
