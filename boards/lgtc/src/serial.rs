//! VESNA serial port
//!
//! The port is opened 8N1 at the configured baud rate. A reader thread owns
//! a clone of the port, turns the byte stream into lines and passes them to
//! the supervisor through an `embassy-sync` channel; writes go straight to
//! the port from the executor.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tracing::{debug, info, warn};

use crate::error::BoardError;

/// Serial lines buffered between the reader thread and the supervisor
pub const LINE_DEPTH: usize = 32;

/// Read timeout; the reader thread just tries again
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// What the reader thread reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialEvent {
    Line(String),
    Closed,
}

pub type LineQueue = Channel<CriticalSectionRawMutex, SerialEvent, LINE_DEPTH>;

/// Write side of the VESNA serial link
pub struct SerialPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPort {
    /// Open the device and start the reader thread
    pub fn open(path: &Path, baud: u32, lines: &'static LineQueue) -> Result<Self, BoardError> {
        let device = path.display().to_string();
        let serial_error = |source| BoardError::Serial {
            device: device.clone(),
            source,
        };

        let port = serialport::new(device.as_str(), baud)
            .timeout(READ_TIMEOUT)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()
            .map_err(serial_error)?;
        let reader = port.try_clone().map_err(serial_error)?;

        thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || read_lines(reader, lines))?;
        info!(%device, baud, "Connected to VESNA");
        Ok(Self { port })
    }
}

impl Write for SerialPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

/// Reader thread body
///
/// Read timeouts only mean VESNA is quiet; a partial line survives them.
fn read_lines<R: Read>(port: R, lines: &LineQueue) {
    let mut reader = BufReader::new(port);
    let mut buf = Vec::new();
    loop {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) if buf.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                debug!(%line, "<- VESNA");
                push(lines, SerialEvent::Line(line));
                buf.clear();
            }
            // End of stream in the middle of a line
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("Serial read failed: {}", e);
                break;
            }
        }
    }
    if !buf.is_empty() {
        let line = String::from_utf8_lossy(&buf).trim_end().to_string();
        push(lines, SerialEvent::Line(line));
    }
    push(lines, SerialEvent::Closed);
}

/// Hand an event to the executor, waiting for room in the queue
fn push(lines: &LineQueue, event: SerialEvent) {
    embassy_futures::block_on(lines.send(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    /// Serves its chunks in order, with a read timeout in between
    struct Quiet {
        chunks: std::collections::VecDeque<&'static [u8]>,
        timed_out: bool,
    }

    impl Quiet {
        fn new(chunks: &[&'static [u8]]) -> Self {
            Self {
                chunks: chunks.iter().copied().collect(),
                timed_out: false,
            }
        }
    }

    impl Read for Quiet {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.timed_out && !self.chunks.is_empty() {
                self.timed_out = true;
                return Err(io::ErrorKind::TimedOut.into());
            }
            self.timed_out = false;
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_lines_then_closed() {
        static LINES: LineQueue = Channel::new();
        read_lines(&b"hello\r\nrssi -70\n"[..], &LINES);

        assert_eq!(block_on(LINES.receive()), SerialEvent::Line("hello".into()));
        assert_eq!(block_on(LINES.receive()), SerialEvent::Line("rssi -70".into()));
        assert_eq!(block_on(LINES.receive()), SerialEvent::Closed);
    }

    #[test]
    fn test_partial_line_survives_timeouts() {
        static LINES: LineQueue = Channel::new();
        read_lines(Quiet::new(&[b"rs", b"si -7", b"0\nlast"]), &LINES);

        assert_eq!(block_on(LINES.receive()), SerialEvent::Line("rssi -70".into()));
        assert_eq!(block_on(LINES.receive()), SerialEvent::Line("last".into()));
        assert_eq!(block_on(LINES.receive()), SerialEvent::Closed);
    }

    #[test]
    fn test_reader_waits_for_room() {
        static LINES: LineQueue = Channel::new();
        let input: String = (0..LINE_DEPTH + 4).map(|i| format!("{i}\n")).collect();
        let reader = thread::spawn(move || read_lines(input.as_bytes(), &LINES));

        for i in 0..LINE_DEPTH + 4 {
            assert_eq!(block_on(LINES.receive()), SerialEvent::Line(i.to_string()));
        }
        assert_eq!(block_on(LINES.receive()), SerialEvent::Closed);
        reader.join().unwrap();
    }

    #[test]
    fn test_missing_device() {
        static LINES: LineQueue = Channel::new();
        let result = SerialPort::open(Path::new("/nonexistent/ttyS9"), 115_200, &LINES);
        assert!(matches!(result, Err(BoardError::Serial { .. })));
    }
}
