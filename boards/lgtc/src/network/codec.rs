//! Line-oriented wire format for the broker link
//!
//! One frame per line, fields separated by a tab:
//!
//! | frame | meaning |
//! |---|---|
//! | `HELLO\t<node>` | sent once after connecting |
//! | `SYS\t-1\t<payload>` | system envelope |
//! | `CMD\t<seq>\t<payload>` | experiment envelope |
//! | `ACK\t<seq>` | acknowledgement |
//!
//! The payload is the last field, so it may itself contain tabs.

use lgtc_core::{Envelope, Frame, Kind, SYSTEM_SEQUENCE_ID};

use super::error::CodecError;

const HELLO: &str = "HELLO";
const SYSTEM: &str = "SYS";
const EXPERIMENT: &str = "CMD";
const ACK: &str = "ACK";

/// Greeting line announcing the node name
pub fn hello(node: &str) -> String {
    format!("{HELLO}\t{node}")
}

/// Wire line for an outgoing envelope
pub fn encode(envelope: &Envelope) -> String {
    let tag = match envelope.kind() {
        Kind::System => SYSTEM,
        Kind::Experiment => EXPERIMENT,
    };
    format!("{tag}\t{}\t{}", envelope.sequence_id(), envelope.payload())
}

/// Wire line acknowledging `sequence_id`
pub fn encode_ack(sequence_id: &str) -> String {
    format!("{ACK}\t{sequence_id}")
}

/// Decode one line (without its terminator)
pub fn decode(line: &str) -> Result<Frame, CodecError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(CodecError::Empty);
    }

    let mut fields = line.splitn(3, '\t');
    let tag = fields.next().unwrap_or_default();
    match tag {
        ACK => {
            let sequence_id = fields.next().ok_or(CodecError::MissingField(ACK))?;
            Ok(Frame::ack(sequence_id)?)
        }
        SYSTEM => {
            let sequence_id = fields.next().ok_or(CodecError::MissingField(SYSTEM))?;
            if sequence_id != SYSTEM_SEQUENCE_ID {
                return Err(CodecError::NotSystem(sequence_id.to_string()));
            }
            let payload = fields.next().ok_or(CodecError::MissingField(SYSTEM))?;
            Ok(Frame::Message(Envelope::new(sequence_id, payload)?))
        }
        EXPERIMENT => {
            let sequence_id = fields.next().ok_or(CodecError::MissingField(EXPERIMENT))?;
            let payload = fields.next().ok_or(CodecError::MissingField(EXPERIMENT))?;
            Ok(Frame::Message(Envelope::new(sequence_id, payload)?))
        }
        other => Err(CodecError::UnknownTag(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lgtc_core::EnvelopeError;

    #[test]
    fn test_encode_by_kind() {
        let report = Envelope::system("RUNNING").unwrap();
        assert_eq!(encode(&report), "SYS\t-1\tRUNNING");

        let reply = Envelope::new("42", "Stored 7 lines").unwrap();
        assert_eq!(encode(&reply), "CMD\t42\tStored 7 lines");
    }

    #[test]
    fn test_hello_and_ack() {
        assert_eq!(hello("LGTC66"), "HELLO\tLGTC66");
        assert_eq!(encode_ack("-1"), "ACK\t-1");
    }

    #[test]
    fn test_decode_frames() {
        assert_eq!(decode("ACK\t42"), Ok(Frame::ack("42").unwrap()));
        assert_eq!(
            decode("SYS\t-1\tFLASH\r\n"),
            Ok(Frame::Message(Envelope::system("FLASH").unwrap()))
        );
        assert_eq!(
            decode("CMD\t42\tLINES"),
            Ok(Frame::Message(Envelope::new("42", "LINES").unwrap()))
        );
    }

    #[test]
    fn test_payload_keeps_tabs() {
        let frame = decode("CMD\t9\ta\tb").unwrap();
        assert_eq!(
            frame,
            Frame::Message(Envelope::new("9", "a\tb").unwrap())
        );
    }

    #[test]
    fn test_decode_errors() {
        assert_eq!(decode(""), Err(CodecError::Empty));
        assert_eq!(decode("  \r\n"), Err(CodecError::Empty));
        assert_eq!(
            decode("PING\t1"),
            Err(CodecError::UnknownTag("PING".to_string()))
        );
        assert_eq!(decode("CMD\t42"), Err(CodecError::MissingField("CMD")));
        assert_eq!(decode("ACK"), Err(CodecError::MissingField("ACK")));
        assert_eq!(
            decode("SYS\t3\tFLASH"),
            Err(CodecError::NotSystem("3".to_string()))
        );
        assert_eq!(
            decode("ACK\t"),
            Err(CodecError::Envelope(EnvelopeError::EmptySequenceId))
        );
    }
}
