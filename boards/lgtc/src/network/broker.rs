//! TCP broker link
//!
//! A reader thread owns the read half of the socket, decodes one frame per
//! line and hands it to the executor through an `embassy-sync` channel.
//! The write half stays with the link; writes are small and synchronous.
//!
//! Every decoded message is acknowledged as it is handed to the relay, so
//! the broker can stop retransmitting it.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use lgtc_core::{BrokerLink, Envelope, Frame};
use tracing::{debug, info, warn};

use super::codec;
use super::error::LinkError;

/// Frames buffered between the reader thread and the relay
pub const INBOUND_DEPTH: usize = 16;

/// What the reader thread reports
#[derive(Debug)]
pub enum LinkEvent {
    Frame(Frame),
    Closed,
}

/// Channel shared by the reader thread and the link
pub type InboundQueue = Channel<CriticalSectionRawMutex, LinkEvent, INBOUND_DEPTH>;

/// Broker connection over a plain TCP socket
pub struct TcpBrokerLink {
    writer: TcpStream,
    inbound: &'static InboundQueue,
    /// The reader thread reported the close and has exited
    closed: bool,
}

impl TcpBrokerLink {
    /// Connect, greet the broker and start the reader thread
    pub fn connect(
        address: &str,
        node: &str,
        inbound: &'static InboundQueue,
    ) -> Result<Self, LinkError> {
        info!(%address, "Connecting to broker");
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        Self::from_stream(stream, node, inbound)
    }

    fn from_stream(
        stream: TcpStream,
        node: &str,
        inbound: &'static InboundQueue,
    ) -> Result<Self, LinkError> {
        let reader = stream.try_clone()?;
        let mut link = Self {
            writer: stream,
            inbound,
            closed: false,
        };
        link.write_line(&codec::hello(node))?;

        thread::Builder::new()
            .name("broker-rx".into())
            .spawn(move || read_frames(reader, inbound))?;
        Ok(link)
    }

    fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        debug!(line, "-> broker");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl BrokerLink for TcpBrokerLink {
    type Error = LinkError;

    async fn transmit(&mut self, envelope: &Envelope) -> Result<(), Self::Error> {
        self.write_line(&codec::encode(envelope))
    }

    async fn receive(&mut self) -> Result<Frame, Self::Error> {
        if self.closed {
            return Err(LinkError::Closed);
        }
        // The only await point is the channel receive, which loses nothing
        // when cancelled
        match self.inbound.receive().await {
            LinkEvent::Frame(frame) => {
                if let Frame::Message(envelope) = &frame {
                    if let Err(e) = self.write_line(&codec::encode_ack(envelope.sequence_id())) {
                        warn!("Failed to acknowledge {}: {}", envelope, e);
                    }
                }
                Ok(frame)
            }
            LinkEvent::Closed => {
                self.closed = true;
                Err(LinkError::Closed)
            }
        }
    }
}

/// Reader thread body
fn read_frames(stream: TcpStream, inbound: &'static InboundQueue) {
    for line in BufReader::new(stream).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Broker read failed: {}", e);
                break;
            }
        };
        debug!(%line, "<- broker");
        match codec::decode(&line) {
            Ok(frame) => push(inbound, LinkEvent::Frame(frame)),
            Err(e) => warn!("Dropping broker line {:?}: {}", line, e),
        }
    }
    push(inbound, LinkEvent::Closed);
}

/// Hand an event to the executor, waiting for room in the queue
fn push(inbound: &InboundQueue, event: LinkEvent) {
    embassy_futures::block_on(inbound.send(event));
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use std::net::TcpListener;

    fn pair(inbound: &'static InboundQueue) -> (TcpBrokerLink, BufReader<TcpStream>, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let link = TcpBrokerLink::connect(&address, "LGTC66", inbound).unwrap();
        let (server, _) = listener.accept().unwrap();
        let reader = BufReader::new(server.try_clone().unwrap());
        (link, reader, server)
    }

    fn next_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    #[test]
    fn test_hello_then_envelopes() {
        static INBOUND: InboundQueue = Channel::new();
        let (mut link, mut reader, _server) = pair(&INBOUND);

        assert_eq!(next_line(&mut reader), "HELLO\tLGTC66");
        block_on(link.transmit(&Envelope::system("ONLINE").unwrap())).unwrap();
        assert_eq!(next_line(&mut reader), "SYS\t-1\tONLINE");
    }

    #[test]
    fn test_inbound_message_is_acked() {
        static INBOUND: InboundQueue = Channel::new();
        let (mut link, mut reader, mut server) = pair(&INBOUND);
        assert_eq!(next_line(&mut reader), "HELLO\tLGTC66");

        server.write_all(b"garbage\nCMD\t42\tLINES\nACK\t-1\n").unwrap();

        let frame = block_on(link.receive()).unwrap();
        assert_eq!(frame, Frame::Message(Envelope::new("42", "LINES").unwrap()));
        assert_eq!(next_line(&mut reader), "ACK\t42");

        let frame = block_on(link.receive()).unwrap();
        assert_eq!(frame, Frame::ack("-1").unwrap());
    }

    #[test]
    fn test_closed_connection() {
        static INBOUND: InboundQueue = Channel::new();
        let (mut link, reader, server) = pair(&INBOUND);
        drop(reader);
        drop(server);

        assert!(matches!(block_on(link.receive()), Err(LinkError::Closed)));
        // The reader thread is gone; the close is reported again
        assert!(matches!(block_on(link.receive()), Err(LinkError::Closed)));
    }

    #[test]
    fn test_reader_waits_for_room() {
        static INBOUND: InboundQueue = Channel::new();
        let (mut link, mut reader, mut server) = pair(&INBOUND);
        assert_eq!(next_line(&mut reader), "HELLO\tLGTC66");

        let burst: String = (0..INBOUND_DEPTH + 4)
            .map(|i| format!("CMD\t{i}\tSEC\n"))
            .collect();
        server.write_all(burst.as_bytes()).unwrap();

        // More frames than the queue holds, none lost
        for i in 0..INBOUND_DEPTH + 4 {
            let frame = block_on(link.receive()).unwrap();
            assert_eq!(frame, Frame::Message(Envelope::new(&i.to_string(), "SEC").unwrap()));
            assert_eq!(next_line(&mut reader), format!("ACK\t{i}"));
        }
    }
}
