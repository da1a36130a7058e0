use crate::shared::time::{iso8601, now_utc};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

pub fn format_log_line(stream: StreamKind, chunk: &str) -> String {
    format!("[{}] [{}] {}", iso8601(now_utc()), stream.as_str(), chunk)
}

#[derive(Debug, Clone)]
pub struct RunLogWriter {
    file: Arc<Mutex<File>>,
}

impl RunLogWriter {
    /// Creates the run log; an existing log means the run is already supervised.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn append(&self, stream: StreamKind, chunk: &str) -> std::io::Result<()> {
        let line = format_log_line(stream, chunk.trim_end_matches(['\r', '\n']));
        let mut file = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(file, "{line}")?;
        file.flush()
    }

    pub fn capture<R: Read>(&self, stream: StreamKind, source: R) -> std::io::Result<()> {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            self.append(stream, &String::from_utf8_lossy(&buf))?;
        }
    }
}

pub fn read_log(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn read_log_tail(path: &Path, max_lines: usize) -> String {
    let Ok(Some(raw)) = read_log(path) else {
        return String::new();
    };
    let lines = raw.lines().collect::<Vec<_>>();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn captured_chunks_are_prefixed_with_timestamp_and_stream() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run.log");
        let writer = RunLogWriter::create(&path).expect("create");
        writer
            .capture(StreamKind::Stdout, "hello\nworld\n".as_bytes())
            .expect("capture stdout");
        writer
            .capture(StreamKind::Stderr, "oops".as_bytes())
            .expect("capture stderr");

        let raw = read_log(&path).expect("read").expect("present");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] [stdout] hello"));
        assert!(lines[1].ends_with("] [stdout] world"));
        assert!(lines[2].ends_with("] [stderr] oops"));
        assert!(lines[0].contains('T') && lines[0].contains("Z]"));
    }

    #[test]
    fn a_run_log_is_created_only_once() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("runs").join("run.log");
        let first = RunLogWriter::create(&path).expect("first create");
        first.append(StreamKind::Stdout, "kept\n").expect("append");

        let err = RunLogWriter::create(&path).expect_err("second create");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let raw = read_log(&path).expect("read").expect("present");
        assert!(raw.ends_with("] [stdout] kept\n"));
    }

    #[test]
    fn tail_keeps_only_the_last_lines() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("run.log");
        let body = (1..=60).map(|n| format!("line {n}\n")).collect::<String>();
        fs::write(&path, body).expect("write");

        let tail = read_log_tail(&path, 50);
        let lines = tail.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], "line 11");
        assert_eq!(lines[49], "line 60");
        assert_eq!(read_log_tail(&dir.path().join("missing.log"), 50), "");
    }
}
