//! Core types and constants for the fernlink transport.

use alloc::vec::Vec;
use core::fmt;

use crate::time::Duration;

/// 8-bit mesh address. Assignable node ids are 1..=254.
pub type NodeId = u8;

/// Address of the tree root. Terminus of all uplink traffic.
pub const GATEWAY_ADDRESS: NodeId = 0;
/// Broadcast destination. Also the "unassigned / auto" id sentinel.
pub const BROADCAST_ADDRESS: NodeId = 255;
/// Node id requesting dynamic assignment.
pub const AUTO_ID: NodeId = 255;

/// Hop count to the gateway when unknown or unreachable.
pub const DISTANCE_INVALID: u8 = 255;
/// Maximum meaningful hop count for ping/pong accounting.
pub const MAX_HOPS: u8 = 254;
/// Hop count sentinel for "no answer received".
pub const INVALID_HOPS: u8 = 255;

/// Wire protocol version (3-bit field).
pub const PROTOCOL_VERSION: u8 = 2;
/// Fixed header length in bytes.
pub const HEADER_LEN: usize = 8;
/// Payload MTU. Bounded by the 4-bit length field.
pub const MAX_PAYLOAD: usize = 15;
/// Trailing signature length when the signing-present bit is set.
pub const SIGNATURE_LEN: usize = 32;
/// Largest possible wire frame: header + payload + signature.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD + SIGNATURE_LEN;

/// Frames drained from the RX FIFO per `process()` tick. Bounds latency of
/// the state machine when a neighbor floods us.
pub const MAX_SUBSEQ_MSGS: u8 = 5;

/// General state timeout before a retry is considered.
pub const STATE_TIMEOUT: Duration = Duration::from_secs(2);
/// Re-entries of a state before escalating to Failure.
pub const STATE_RETRIES: u8 = 3;
/// Time spent powered down in Failure before re-initializing.
pub const FAILURE_RECOVERY_DELAY: Duration = Duration::from_secs(10);
/// Minimum interval between gateway uplink checks (flood control).
pub const UPLINK_CHECK_INTERVAL: Duration = Duration::from_secs(10);
/// Minimum interval between radio self-tests.
pub const SANITY_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// Consecutive uplink send failures before a leaf searches a new parent.
pub const TRANSMISSION_FAILURES_LEAF: u8 = 5;
/// Same threshold for repeaters, which should cling to their subtree longer.
pub const TRANSMISSION_FAILURES_REPEATER: u8 = 10;
/// Cap of the failed-uplink counter (4-bit wire field).
pub const FAILED_UPLINK_MAX: u8 = 15;

/// Number of routable destinations (ids 1..=254).
pub const ROUTE_TABLE_SIZE: usize = 254;
/// Routing-table entry meaning "no route known".
pub const ROUTE_NONE: u8 = BROADCAST_ADDRESS;

/// Sensor id used by transport-internal control frames.
pub const SENSOR_INTERNAL: u8 = 255;

// Internal message types (command = Internal). Numbering follows the wire
// protocol; gaps belong to application-level internals that pass through
// to the callback unchanged.
pub const MSG_ID_REQUEST: u8 = 3;
pub const MSG_ID_RESPONSE: u8 = 4;
pub const MSG_FIND_PARENT: u8 = 7;
pub const MSG_FIND_PARENT_RESPONSE: u8 = 8;
pub const MSG_PING: u8 = 24;
pub const MSG_PONG: u8 = 25;

/// Frame command class (4-bit wire field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Node/sensor capability announcements.
    Presentation = 0,
    /// Sensor value updates.
    Set = 1,
    /// Sensor value requests.
    Req = 2,
    /// Transport- and network-internal control.
    Internal = 3,
    /// Multi-frame payload streams (firmware, bulk data).
    Stream = 4,
}

impl Command {
    /// Decode the 4-bit wire value. Unknown commands are dropped at parse time.
    pub fn from_wire(value: u8) -> Option<Command> {
        match value {
            0 => Some(Command::Presentation),
            1 => Some(Command::Set),
            2 => Some(Command::Req),
            3 => Some(Command::Internal),
            4 => Some(Command::Stream),
            _ => None,
        }
    }

    /// The 4-bit wire value.
    pub fn to_wire(self) -> u8 {
        self as u8
    }
}

/// A parsed wire frame.
///
/// `last_hop` identifies the neighbor a frame was heard from and is rewritten
/// by every forwarder; all other fields travel end to end. The optional
/// signature covers everything except `last_hop` for exactly that reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Neighbor that handed us the frame. Rewritten on every transmit.
    pub last_hop: NodeId,
    /// Originating node.
    pub sender: NodeId,
    /// Final destination, `BROADCAST_ADDRESS` for broadcasts.
    pub destination: NodeId,
    /// Sensor id, `SENSOR_INTERNAL` for transport control.
    pub sensor: u8,
    pub command: Command,
    /// Sender requests an acknowledgement echo.
    pub ack_request: bool,
    /// This frame is an acknowledgement echo.
    pub is_ack: bool,
    /// Sender requests signed traffic from its peers.
    pub signing_requested: bool,
    /// Message type within the command class.
    pub msg_type: u8,
    /// Payload type tag (4-bit field), opaque to the transport.
    pub payload_type: u8,
    /// Sender's failed-uplink counter at transmit time (4-bit field).
    pub failed_uplink: u8,
    pub payload: Vec<u8>,
    /// Trailing signature, present when the signing-present bit is set.
    pub signature: Option<[u8; SIGNATURE_LEN]>,
}

impl Frame {
    /// Build an application frame. Payload is truncated to `MAX_PAYLOAD`.
    pub fn new(
        sender: NodeId,
        destination: NodeId,
        sensor: u8,
        command: Command,
        msg_type: u8,
        payload: &[u8],
    ) -> Frame {
        let mut body = Vec::with_capacity(payload.len().min(MAX_PAYLOAD));
        body.extend_from_slice(&payload[..payload.len().min(MAX_PAYLOAD)]);
        Frame {
            last_hop: sender,
            sender,
            destination,
            sensor,
            command,
            ack_request: false,
            is_ack: false,
            signing_requested: false,
            msg_type,
            payload_type: 0,
            failed_uplink: 0,
            payload: body,
            signature: None,
        }
    }

    /// Build a single-byte transport control frame.
    pub fn internal(sender: NodeId, destination: NodeId, msg_type: u8, value: u8) -> Frame {
        Frame::new(
            sender,
            destination,
            SENSOR_INTERNAL,
            Command::Internal,
            msg_type,
            &[value],
        )
    }

    /// True for transport control frames of the given internal type.
    pub fn is_internal(&self, msg_type: u8) -> bool {
        self.command == Command::Internal && self.msg_type == msg_type
    }

    /// The single-byte payload of control frames: hop counters, advertised
    /// distances, assigned ids. [`INVALID_HOPS`] when the payload is empty.
    pub fn value(&self) -> u8 {
        self.payload.first().copied().unwrap_or(INVALID_HOPS)
    }

    /// Overwrite the single-byte control payload.
    pub fn set_value(&mut self, value: u8) {
        if self.payload.is_empty() {
            self.payload.push(value);
        } else {
            self.payload[0] = value;
        }
    }
}

/// Transport counters for monitoring.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportMetrics {
    /// Frames successfully parsed from the RX FIFO.
    pub received: u64,
    /// Frames handed to the application queue.
    pub delivered: u64,
    /// Frames relayed or re-broadcast on behalf of others.
    pub forwarded: u64,
    /// Frames dropped (version, signature, no route, full queue).
    pub dropped: u64,
    /// Frames handed to the radio driver.
    pub sent: u64,
    /// Sends the radio reported as unacknowledged.
    pub send_failures: u64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// True for an assignable node id (not gateway, not broadcast/auto).
pub fn is_valid_node_id(id: NodeId) -> bool {
    id != GATEWAY_ADDRESS && id != AUTO_ID
}

/// True when a hop count can still be used for distance accounting.
pub fn is_valid_distance(distance: u8) -> bool {
    distance != DISTANCE_INVALID
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Presentation => "presentation",
            Command::Set => "set",
            Command::Req => "req",
            Command::Internal => "internal",
            Command::Stream => "stream",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wire_roundtrip() {
        for v in 0..=4u8 {
            let cmd = Command::from_wire(v).unwrap();
            assert_eq!(cmd.to_wire(), v);
        }
        for v in 5..=15u8 {
            assert!(Command::from_wire(v).is_none());
        }
    }

    #[test]
    fn internal_frame_carries_single_byte() {
        let f = Frame::internal(4, GATEWAY_ADDRESS, MSG_PING, 0);
        assert_eq!(f.sensor, SENSOR_INTERNAL);
        assert_eq!(f.command, Command::Internal);
        assert_eq!(f.payload, &[0]);
        assert_eq!(f.value(), 0);
    }

    #[test]
    fn payload_is_bounded() {
        let big = [0xAAu8; 64];
        let f = Frame::new(1, 2, 0, Command::Set, 0, &big);
        assert_eq!(f.payload.len(), MAX_PAYLOAD);
    }

    #[test]
    fn set_value_on_empty_payload() {
        let mut f = Frame::new(1, 2, SENSOR_INTERNAL, Command::Internal, MSG_PONG, &[]);
        assert_eq!(f.value(), INVALID_HOPS);
        f.set_value(3);
        assert_eq!(f.value(), 3);
    }

    #[test]
    fn address_predicates() {
        assert!(!is_valid_node_id(GATEWAY_ADDRESS));
        assert!(!is_valid_node_id(AUTO_ID));
        assert!(is_valid_node_id(1));
        assert!(is_valid_node_id(254));
        assert!(!is_valid_distance(DISTANCE_INVALID));
        assert!(is_valid_distance(0));
    }
}
