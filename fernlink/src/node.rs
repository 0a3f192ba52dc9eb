//! The transport node: owned context and public surface.
//!
//! A [`Node`] owns every piece of transport state plus the injected drivers.
//! The host calls [`Node::initialize`] once and then [`Node::process`] from
//! its main loop; everything else happens inside those ticks. Nothing here
//! blocks longer than the bounded wait in [`Node::ping_node`].
//!
//! The implementation is split across files: the state machine lives in
//! `fsm.rs` and the message processor in `routing.rs`, both as further
//! `impl Node` blocks.

use alloc::boxed::Box;

use crate::config::NodeOptions;
use crate::debug::{DebugEmitter, DebugEvent};
use crate::fsm::State;
use crate::table::RouteTable;
use crate::time::{Duration, Timestamp};
use crate::traits::{AppInChannel, Clock, Radio, Signer, Storage};
use crate::types::{
    Command, Frame, NodeId, TransportMetrics, GATEWAY_ADDRESS, INVALID_HOPS, MSG_PING, MSG_PONG,
    STATE_TIMEOUT, UPLINK_CHECK_INTERVAL,
};

/// A mesh transport node.
///
/// Generic over:
/// - `R`: radio driver
/// - `S`: persistent store
/// - `G`: signing module
/// - `C`: monotonic clock
pub struct Node<R, S, G, C> {
    pub(crate) radio: R,
    pub(crate) storage: S,
    pub(crate) signer: G,
    pub(crate) clock: C,
    pub(crate) opts: NodeOptions,

    // Topology state, mirrored to the store on change.
    pub(crate) node_id: NodeId,
    pub(crate) parent_node_id: NodeId,
    pub(crate) distance: u8,
    pub(crate) table: RouteTable,

    // State machine status.
    pub(crate) state: State,
    pub(crate) state_entered_at: Timestamp,
    pub(crate) last_uplink_check: Timestamp,
    pub(crate) last_sanity_check: Timestamp,
    pub(crate) finding_parent: bool,
    pub(crate) preferred_parent_found: bool,
    pub(crate) uplink_ok: bool,
    pub(crate) ping_active: bool,
    pub(crate) transport_active: bool,
    pub(crate) retries: u8,
    pub(crate) failed_uplink_transmissions: u8,
    pub(crate) ping_response: u8,

    // In-flight control state.
    pub(crate) parent_candidate: Option<(NodeId, u8)>,
    pub(crate) ping_target: NodeId,
    pub(crate) ping_sent_at: Timestamp,
    pub(crate) last_received: Option<(Command, u8)>,

    // Application surface.
    pub(crate) app_incoming: AppInChannel,
    pub(crate) metrics: TransportMetrics,
    pub(crate) emitter: Option<Box<dyn DebugEmitter>>,
}

impl<R, S, G, C> Node<R, S, G, C>
where
    R: Radio,
    S: Storage,
    G: Signer,
    C: Clock,
{
    /// Build a node. It stays in Failure (inert) until [`initialize`] runs.
    ///
    /// [`initialize`]: Node::initialize
    pub fn new(radio: R, storage: S, signer: G, clock: C, opts: NodeOptions) -> Self {
        Self {
            radio,
            storage,
            signer,
            clock,
            table: RouteTable::new(opts.repeater || opts.gateway),
            opts,

            node_id: crate::types::AUTO_ID,
            parent_node_id: crate::types::AUTO_ID,
            distance: crate::types::DISTANCE_INVALID,

            state: State::Failure,
            state_entered_at: Timestamp::ZERO,
            last_uplink_check: Timestamp::ZERO,
            last_sanity_check: Timestamp::ZERO,
            finding_parent: false,
            preferred_parent_found: false,
            uplink_ok: false,
            ping_active: false,
            transport_active: false,
            retries: 0,
            failed_uplink_transmissions: 0,
            ping_response: INVALID_HOPS,

            parent_candidate: None,
            ping_target: GATEWAY_ADDRESS,
            ping_sent_at: Timestamp::ZERO,
            last_received: None,

            app_incoming: AppInChannel::new(),
            metrics: TransportMetrics::new(),
            emitter: None,
        }
    }

    /// Load persisted identity, parent, distance, and routes, then enter Init.
    pub fn initialize(&mut self) {
        self.node_id = self.storage.load_node_id();
        self.parent_node_id = self.storage.load_parent();
        self.distance = self.storage.load_distance();
        self.table.load(&mut self.storage);
        self.switch_state(State::Init);
    }

    /// One cooperative tick: drain the RX FIFO (bounded), run the current
    /// state's update, run the radio self-test when due.
    ///
    /// Call repeatedly from the application main loop.
    pub fn process(&mut self) {
        self.process_fifo();
        self.update_fsm();
        self.maybe_sanity_check();
    }

    /// Send an application frame. Succeeds only in Ready; while a parent
    /// election runs, sends fail immediately so they cannot clobber it.
    pub fn send_route(&mut self, frame: &mut Frame) -> bool {
        if self.state != State::Ready {
            self.emit(DebugEvent::SendNotReady);
            return false;
        }
        self.route_message(frame)
    }

    /// True once the state machine reached Ready.
    pub fn is_ready(&self) -> bool {
        self.state == State::Ready
    }

    /// True while the find-parent election is running.
    pub fn is_searching_parent(&self) -> bool {
        self.finding_parent
    }

    /// Forget every learned route and persist the empty table.
    pub fn clear_routing_table(&mut self) {
        self.table.clear(&mut self.storage);
        self.emit(DebugEvent::RoutingTableCleared);
    }

    /// Milliseconds spent in the current state.
    pub fn heartbeat(&self) -> u64 {
        self.time_in_state().as_millis()
    }

    /// Ping `target` and wait up to the state timeout for the pong, pumping
    /// the RX FIFO meanwhile (the only in-stack wait in the crate). Returns
    /// the pong's hop count, or [`INVALID_HOPS`] on timeout.
    pub fn ping_node(&mut self, target: NodeId) -> u8 {
        if self.ping_active {
            return INVALID_HOPS;
        }
        if !self.start_ping(target) {
            self.ping_active = false;
            return INVALID_HOPS;
        }
        self.transport_wait(STATE_TIMEOUT, Command::Internal, MSG_PONG);
        self.ping_active = false;
        self.ping_response
    }

    /// Check the gateway uplink, flood-controlled to one ping per
    /// [`UPLINK_CHECK_INTERVAL`] unless `force` is set.
    ///
    /// The check is issued here and completes on a later tick when the pong
    /// arrives (updating status, distance, and the failure counter); the
    /// return value is the last known uplink status.
    pub fn check_uplink(&mut self, force: bool) -> bool {
        if self.opts.gateway {
            return true;
        }
        if self.ping_active {
            return self.uplink_ok;
        }
        let now = self.clock.now();
        if !force && now.saturating_sub(self.last_uplink_check) < UPLINK_CHECK_INTERVAL {
            self.emit(DebugEvent::UplinkFloodControl);
            return self.uplink_ok;
        }
        self.last_uplink_check = now;
        if !self.start_ping(GATEWAY_ADDRESS) {
            // The ping itself failed to send; the route path already counted
            // it, so don't let the pong timeout count it again.
            self.ping_active = false;
        }
        self.uplink_ok
    }

    /// Issue a ping without waiting. The pong handler fills in
    /// `ping_response` and, for gateway pings, the uplink status.
    pub(crate) fn start_ping(&mut self, target: NodeId) -> bool {
        self.ping_active = true;
        self.ping_target = target;
        self.ping_response = INVALID_HOPS;
        self.ping_sent_at = self.clock.now();
        self.emit(DebugEvent::PingSent { to: target });
        let mut ping = Frame::internal(self.node_id, target, MSG_PING, 0);
        self.route_message(&mut ping)
    }

    /// Pump the RX FIFO until a frame with the given command and message
    /// type is processed or `timeout` elapses. Cooperative: runs in the
    /// caller's stack frame, no hidden scheduling.
    pub(crate) fn transport_wait(
        &mut self,
        timeout: Duration,
        command: Command,
        msg_type: u8,
    ) -> bool {
        self.last_received = None;
        let deadline = self.clock.now() + timeout;
        while self.clock.now() < deadline {
            self.process_fifo();
            if self.last_received == Some((command, msg_type)) {
                return true;
            }
        }
        false
    }

    /// Frames addressed to this node's application layer.
    pub fn incoming(&self) -> &AppInChannel {
        &self.app_incoming
    }

    /// Install a debug emitter. Pass events to a log channel, or collect
    /// them in tests; without one the node stays silent.
    pub fn set_debug_emitter(&mut self, emitter: Box<dyn DebugEmitter>) {
        self.emitter = Some(emitter);
    }

    pub(crate) fn emit(&mut self, event: DebugEvent) {
        if let Some(emitter) = self.emitter.as_mut() {
            emitter.emit(event);
        }
    }

    pub fn metrics(&self) -> &TransportMetrics {
        &self.metrics
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn parent_node_id(&self) -> NodeId {
        self.parent_node_id
    }

    /// Hop count to the gateway, [`DISTANCE_INVALID`](crate::types::DISTANCE_INVALID)
    /// while unknown.
    pub fn distance(&self) -> u8 {
        self.distance
    }

    pub fn is_repeater(&self) -> bool {
        self.table.is_repeater()
    }

    /// Hop count returned by the most recent pong.
    pub fn ping_response(&self) -> u8 {
        self.ping_response
    }

    /// Consecutive failed uplink sends since the last success.
    pub fn failed_uplink_transmissions(&self) -> u8 {
        self.failed_uplink_transmissions
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persist a new parent and distance. Skips unchanged values to spare
    /// EEPROM-class stores.
    pub(crate) fn set_parent(&mut self, parent: NodeId, distance: u8) {
        if self.parent_node_id != parent {
            self.parent_node_id = parent;
            self.storage.save_parent(parent);
        }
        if self.distance != distance {
            self.distance = distance;
            self.storage.save_distance(distance);
        }
    }
}
