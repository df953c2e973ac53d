//! Append-only experiment result file
//!
//! One line per VESNA serial line, flushed as it is written so a crash
//! loses at most the line in flight. Command/reply pairs exchanged with
//! VESNA are kept in the same file but not counted as stored lines.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::BoardError;

pub struct ResultFile<W = File> {
    sink: W,
    stored: u32,
}

impl ResultFile<File> {
    /// Open (or create) the file for appending
    pub fn open(path: &Path) -> Result<Self, BoardError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| BoardError::File {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(file))
    }
}

impl<W: Write> ResultFile<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, stored: 0 }
    }

    /// Store one serial line
    pub fn store_line(&mut self, line: &str) -> io::Result<()> {
        self.write(line)?;
        self.stored += 1;
        Ok(())
    }

    /// Store a line that is not experiment output
    pub fn store_note(&mut self, note: &str) -> io::Result<()> {
        self.write(note)
    }

    /// Serial lines stored so far
    pub fn stored(&self) -> u32 {
        self.stored
    }

    fn write(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.sink, "{}", line.trim_end_matches(['\r', '\n']))?;
        self.sink.flush()
    }

    #[cfg(test)]
    pub fn sink(&self) -> &W {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_only_serial_lines() {
        let mut results = ResultFile::new(Vec::new());
        results.store_line("rssi -71\r\n").unwrap();
        results.store_note("> RSSI").unwrap();
        results.store_line("rssi -68").unwrap();

        assert_eq!(results.stored(), 2);
        assert_eq!(
            String::from_utf8(results.sink().clone()).unwrap(),
            "rssi -71\n> RSSI\nrssi -68\n"
        );
    }

    #[test]
    fn test_open_appends() {
        let path = std::env::temp_dir().join(format!("lgtc-results-{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);

        ResultFile::open(&path).unwrap().store_line("first").unwrap();
        ResultFile::open(&path).unwrap().store_line("second").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
        std::fs::remove_file(&path).unwrap();
    }
}
