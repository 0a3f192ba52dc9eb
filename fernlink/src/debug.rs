//! Debug events for protocol tracing.
//!
//! The core does not log; it emits structured events to an optional
//! [`DebugEmitter`] installed by the host. The simulator collects them per
//! node, embedded targets can map them onto whatever log channel exists,
//! and production builds simply install nothing.

use crate::fsm::State;
use crate::types::{Command, NodeId};
use crate::wire::DecodeError;

/// Trait for receiving debug events from a node.
/// Implemented by test harnesses to collect or print events.
pub trait DebugEmitter: Send {
    fn emit(&mut self, event: DebugEvent);
}

/// Protocol trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugEvent {
    /// The state machine entered a state.
    StateEntered { state: State },
    /// Radio hardware initialization failed.
    TransportInitFailed,
    /// A statically configured node id was adopted.
    StaticNodeId { id: NodeId },
    /// Node runs as gateway; id assignment and parent search are skipped.
    GatewayMode,

    /// A statically configured parent was adopted, search skipped.
    StaticParent { parent: NodeId },
    /// Find-parent request broadcast.
    FindParentRequestSent,
    /// No usable find-parent response arrived within the window.
    FindParentNoReply,
    /// A neighbor asked us to be considered as its parent.
    FindParentRequestFrom { from: NodeId },
    /// A neighbor answered our find-parent request.
    FindParentResponse { from: NodeId, distance: u8 },
    /// A response arrived while no search is active.
    FindParentInactive,
    /// The previously persisted parent answered with an acceptable distance.
    PreferredParentFound,
    /// The election committed a parent.
    ParentSelected { parent: NodeId, distance: u8 },

    /// Id request sent to the gateway.
    IdRequested,
    /// The gateway assigned us an id.
    IdAssigned { id: NodeId },
    /// The assigned id was unusable (gateway or broadcast sentinel).
    IdRejected { id: NodeId },

    /// Gateway answered an uplink ping.
    UplinkOk { hops: u8 },
    /// No pong within the window.
    UplinkFailed,
    /// Check suppressed: the last one was less than the interval ago.
    UplinkFloodControl,
    /// Pong hop count disagrees with the persisted distance.
    TopologyChanged { old_distance: u8, new_distance: u8 },
    /// Too many failed uplink sends. With a static parent it is re-enforced,
    /// otherwise a new parent search starts.
    UplinkFailuresExceeded { static_parent: bool },

    /// A frame was parsed off the RX FIFO.
    MessageRead {
        sender: NodeId,
        last_hop: NodeId,
        destination: NodeId,
        command: Command,
        msg_type: u8,
    },
    /// A frame was handed to the radio.
    MessageSent {
        to: NodeId,
        destination: NodeId,
        command: Command,
        msg_type: u8,
        ok: bool,
    },
    /// Frame dropped: protocol version mismatch.
    VersionMismatch { got: u8 },
    /// Frame dropped: malformed.
    DecodeFailed { error: DecodeError },
    /// Frame dropped: signature did not verify.
    SignatureVerifyFailed { sender: NodeId },

    /// Back-route learned from a relayed frame.
    RouteLearned { destination: NodeId, next_hop: NodeId },
    /// No route for a forwarded destination; falling back to the parent.
    RouteUnknown { destination: NodeId },
    /// Frame relayed toward another node.
    RelayMessage { destination: NodeId },
    /// Relay requested but this node is not a repeater.
    RelayDenied { destination: NodeId },
    /// Relayed ping hop counter incremented.
    RelayPing { hops: u8 },
    /// Controlled broadcast re-transmission.
    BroadcastForwarded { msg_type: u8 },

    /// Incoming frame asked for an acknowledgement echo.
    AckRequested { from: NodeId },
    /// Acknowledgement echo received; forwarded to the application.
    AckReceived { from: NodeId },

    /// Ping sent.
    PingSent { to: NodeId },
    /// We were pinged.
    Pinged { from: NodeId, hops: u8 },
    /// Pong received.
    PongReceived { hops: u8 },

    /// Send refused: transport not ready.
    SendNotReady,
    /// Send refused: parent election in progress.
    ParentSearchActive,
    /// Application queue full; frame dropped.
    AppQueueFull,

    /// Radio self-test passed.
    SanityCheckOk,
    /// Radio self-test failed; transport goes to Failure.
    SanityCheckFailed,
    /// Routing table cleared and persisted.
    RoutingTableCleared,
    /// Radio powered down on entering Failure.
    PowerDown,
    /// Failure recovery timer elapsed; re-initializing.
    ReInit,
}
