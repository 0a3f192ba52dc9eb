//! Wire format serialization and deserialization.
//!
//! Fixed 8-byte header, big-endian bit packing:
//!
//! ```text
//! byte 0  last-hop node id        (rewritten on every transmit)
//! byte 1  sender node id
//! byte 2  destination node id
//! byte 3  sensor id
//! byte 4  command[7:4] | ack-req[3] | ack[2] | signing-req[1] | reserved[0]
//! byte 5  message type
//! byte 6  payload type[7:4] | payload length[3:0]
//! byte 7  version[7:5] | failed-uplink[4:1] | signing-present[0]
//! 8..     payload (<= 15 bytes)
//! tail    32-byte signature when signing-present is set
//! ```
//!
//! A signature covers bytes 1.. of the encoded image (everything but the
//! last-hop byte), so it stays valid while repeaters rewrite last-hop.

use alloc::vec::Vec;
use core::fmt;

use crate::types::{
    Command, Frame, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD, PROTOCOL_VERSION, SIGNATURE_LEN,
};

/// Decoding error types. Any of these drops the frame before processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer shorter than the fixed header.
    Truncated,
    /// Command nibble outside the known set.
    UnknownCommand(u8),
    /// Frame speaks a different protocol revision.
    VersionMismatch { got: u8 },
    /// Buffer length disagrees with the header's length and signing fields.
    LengthMismatch { expected: usize, got: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated => write!(f, "frame shorter than header"),
            DecodeError::UnknownCommand(c) => write!(f, "unknown command {}", c),
            DecodeError::VersionMismatch { got } => {
                write!(f, "protocol version {} != {}", got, PROTOCOL_VERSION)
            }
            DecodeError::LengthMismatch { expected, got } => {
                write!(f, "frame length {} != {}", got, expected)
            }
        }
    }
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + len > self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

/// Cursor writer over a fixed buffer.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }
}

impl Frame {
    /// Encode header + payload, plus the trailing signature when present.
    ///
    /// Returns the number of bytes written. `out` must hold `MAX_FRAME_LEN`
    /// bytes; the payload invariant (`<= MAX_PAYLOAD`) is enforced by the
    /// frame constructors.
    pub fn encode(&self, out: &mut [u8]) -> usize {
        let n = self.encode_body(out, self.signature.is_some());
        match &self.signature {
            Some(sig) => {
                out[n..n + SIGNATURE_LEN].copy_from_slice(sig);
                n + SIGNATURE_LEN
            }
            None => n,
        }
    }

    /// Encode into a fresh vector. Convenience for tests and the simulator.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let n = self.encode(&mut buf);
        buf[..n].to_vec()
    }

    /// The byte region a signature covers: the encoded image with the
    /// signing-present bit forced on, minus last-hop and the signature itself.
    pub fn signable<'a>(&self, scratch: &'a mut [u8; MAX_FRAME_LEN]) -> &'a [u8] {
        let n = self.encode_body(scratch, true);
        &scratch[1..n]
    }

    fn encode_body(&self, out: &mut [u8], signed: bool) -> usize {
        assert!(self.payload.len() <= MAX_PAYLOAD, "payload exceeds MTU");
        let mut w = Writer::new(out);
        w.write_u8(self.last_hop);
        w.write_u8(self.sender);
        w.write_u8(self.destination);
        w.write_u8(self.sensor);
        w.write_u8(
            (self.command.to_wire() << 4)
                | ((self.ack_request as u8) << 3)
                | ((self.is_ack as u8) << 2)
                | ((self.signing_requested as u8) << 1),
        );
        w.write_u8(self.msg_type);
        w.write_u8(((self.payload_type & 0x0F) << 4) | (self.payload.len() as u8));
        w.write_u8(
            (PROTOCOL_VERSION << 5) | ((self.failed_uplink & 0x0F) << 1) | (signed as u8),
        );
        w.write_bytes(&self.payload);
        w.position()
    }

    /// Parse a received frame. Verifies the protocol version and the length
    /// fields; signature *verification* is the caller's job (it needs the
    /// signing module).
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        let mut r = Reader::new(bytes);
        if r.remaining() < HEADER_LEN {
            return Err(DecodeError::Truncated);
        }
        let last_hop = r.read_u8()?;
        let sender = r.read_u8()?;
        let destination = r.read_u8()?;
        let sensor = r.read_u8()?;
        let flags = r.read_u8()?;
        let msg_type = r.read_u8()?;
        let type_len = r.read_u8()?;
        let tail = r.read_u8()?;

        let version = tail >> 5;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::VersionMismatch { got: version });
        }
        let command = Command::from_wire(flags >> 4)
            .ok_or(DecodeError::UnknownCommand(flags >> 4))?;

        let payload_len = (type_len & 0x0F) as usize;
        let signed = tail & 0x01 != 0;
        let expected = HEADER_LEN + payload_len + if signed { SIGNATURE_LEN } else { 0 };
        if bytes.len() != expected {
            return Err(DecodeError::LengthMismatch {
                expected,
                got: bytes.len(),
            });
        }

        let payload = r.read_bytes(payload_len)?.to_vec();
        let signature = if signed {
            let mut sig = [0u8; SIGNATURE_LEN];
            sig.copy_from_slice(r.read_bytes(SIGNATURE_LEN)?);
            Some(sig)
        } else {
            None
        };

        Ok(Frame {
            last_hop,
            sender,
            destination,
            sensor,
            command,
            ack_request: flags & 0x08 != 0,
            is_ack: flags & 0x04 != 0,
            signing_requested: flags & 0x02 != 0,
            msg_type,
            payload_type: type_len >> 4,
            failed_uplink: (tail >> 1) & 0x0F,
            payload,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MSG_PING, SENSOR_INTERNAL};

    fn sample() -> Frame {
        let mut f = Frame::new(7, 0, 2, Command::Set, 13, &[1, 2, 3, 4]);
        f.last_hop = 9;
        f.ack_request = true;
        f.payload_type = 5;
        f.failed_uplink = 3;
        f
    }

    #[test]
    fn roundtrip_identity() {
        let frame = sample();
        let bytes = frame.encode_to_vec();
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        let back = Frame::decode(&bytes).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn roundtrip_preserves_all_but_last_hop_on_forward() {
        let frame = sample();
        let mut bytes = frame.encode_to_vec();
        // A forwarder rewrites only byte 0.
        bytes[0] = 42;
        let back = Frame::decode(&bytes).unwrap();
        assert_eq!(back.last_hop, 42);
        let mut expected = frame;
        expected.last_hop = 42;
        assert_eq!(back, expected);
    }

    #[test]
    fn signed_roundtrip() {
        let mut frame = sample();
        frame.signature = Some([0xAB; SIGNATURE_LEN]);
        let bytes = frame.encode_to_vec();
        assert_eq!(bytes.len(), HEADER_LEN + 4 + SIGNATURE_LEN);
        let back = Frame::decode(&bytes).unwrap();
        assert_eq!(back.signature, Some([0xAB; SIGNATURE_LEN]));
        assert_eq!(back, frame);
    }

    #[test]
    fn signable_region_skips_last_hop() {
        let mut frame = sample();
        let mut scratch_a = [0u8; MAX_FRAME_LEN];
        let a = frame.signable(&mut scratch_a).to_vec();
        frame.last_hop = 200;
        let mut scratch_b = [0u8; MAX_FRAME_LEN];
        let b = frame.signable(&mut scratch_b).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn version_mismatch_rejected() {
        let frame = Frame::internal(1, 0, MSG_PING, 0);
        let mut bytes = frame.encode_to_vec();
        bytes[7] = (bytes[7] & 0x1F) | ((PROTOCOL_VERSION + 1) << 5);
        assert_eq!(
            Frame::decode(&bytes),
            Err(DecodeError::VersionMismatch {
                got: PROTOCOL_VERSION + 1
            })
        );
    }

    #[test]
    fn unknown_command_rejected() {
        let frame = Frame::internal(1, 0, MSG_PING, 0);
        let mut bytes = frame.encode_to_vec();
        bytes[4] = 0x0F << 4;
        assert_eq!(Frame::decode(&bytes), Err(DecodeError::UnknownCommand(15)));
    }

    #[test]
    fn truncated_and_length_mismatch_rejected() {
        let frame = Frame::new(1, 2, 0, Command::Set, 0, &[1, 2, 3]);
        let bytes = frame.encode_to_vec();
        assert_eq!(Frame::decode(&bytes[..4]), Err(DecodeError::Truncated));
        assert_eq!(
            Frame::decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::LengthMismatch {
                expected: HEADER_LEN + 3,
                got: HEADER_LEN + 2,
            })
        );
    }

    #[test]
    fn internal_frame_header_bits() {
        let frame = Frame::internal(3, 0, MSG_PING, 2);
        let bytes = frame.encode_to_vec();
        assert_eq!(bytes[3], SENSOR_INTERNAL);
        assert_eq!(bytes[4] >> 4, Command::Internal.to_wire());
        assert_eq!(bytes[5], MSG_PING);
        assert_eq!(bytes[6] & 0x0F, 1);
        assert_eq!(bytes[7] >> 5, PROTOCOL_VERSION);
    }
}
