//! Transport state machine.
//!
//! Six states drive a node's mesh lifecycle: radio bring-up, parent
//! election, id assignment, uplink verification, steady state, and failure
//! recovery. Each state has an entry function (run exactly once per
//! transition, from [`Node::switch_state`]) and an update function (run on
//! every `process()` tick while current).
//!
//! Waits are tick-driven: a state issues its request on entry and its update
//! polls for the outcome or the timeout. The FIFO is always drained before
//! the update runs, so a response that arrived this tick is observed this
//! tick.

use crate::debug::DebugEvent;
use crate::node::Node;
use crate::time::Duration;
use crate::traits::{Clock, Radio, Signer, Storage};
use crate::types::{
    is_valid_node_id, Frame, BROADCAST_ADDRESS, FAILED_UPLINK_MAX, FAILURE_RECOVERY_DELAY,
    DISTANCE_INVALID, GATEWAY_ADDRESS, INVALID_HOPS, MSG_FIND_PARENT, MSG_ID_REQUEST,
    SANITY_CHECK_INTERVAL, STATE_RETRIES, STATE_TIMEOUT, TRANSMISSION_FAILURES_LEAF,
    TRANSMISSION_FAILURES_REPEATER,
};

/// Transport state tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Radio bring-up and flag reset.
    Init,
    /// Parent election (broadcast request, collect responses).
    FindParent,
    /// Dynamic node id assignment via the gateway.
    RequestId,
    /// Gateway ping before declaring the transport usable.
    VerifyUplink,
    /// Steady state: traffic flows, uplink is monitored.
    Ready,
    /// Radio powered down; re-init after a recovery delay.
    Failure,
}

impl<R, S, G, C> Node<R, S, G, C>
where
    R: Radio,
    S: Storage,
    G: Signer,
    C: Clock,
{
    /// Switch states and run the new state's entry function once.
    ///
    /// Re-entering the current state counts a retry; entering a different
    /// state zeroes the counter. Entry functions may switch again
    /// immediately (static configuration short-circuits do).
    pub(crate) fn switch_state(&mut self, new: State) {
        if self.state == new {
            self.retries = self.retries.saturating_add(1);
        } else {
            self.retries = 0;
        }
        self.state = new;
        self.state_entered_at = self.clock.now();
        self.emit(DebugEvent::StateEntered { state: new });
        match new {
            State::Init => self.st_init_enter(),
            State::FindParent => self.st_find_parent_enter(),
            State::RequestId => self.st_request_id_enter(),
            State::VerifyUplink => self.st_verify_uplink_enter(),
            State::Ready => self.st_ready_enter(),
            State::Failure => self.st_failure_enter(),
        }
    }

    /// Run the current state's update function.
    pub(crate) fn update_fsm(&mut self) {
        match self.state {
            State::Init => {}
            State::FindParent => self.st_find_parent_update(),
            State::RequestId => self.st_request_id_update(),
            State::VerifyUplink => self.st_verify_uplink_update(),
            State::Ready => self.st_ready_update(),
            State::Failure => self.st_failure_update(),
        }
    }

    /// Time spent in the current state.
    pub(crate) fn time_in_state(&self) -> Duration {
        self.clock.now().saturating_sub(self.state_entered_at)
    }

    fn st_init_enter(&mut self) {
        self.finding_parent = false;
        self.preferred_parent_found = false;
        self.uplink_ok = false;
        self.ping_active = false;
        self.transport_active = false;
        self.failed_uplink_transmissions = 0;
        self.ping_response = INVALID_HOPS;
        self.parent_candidate = None;

        if self.opts.gateway {
            if self.node_id != GATEWAY_ADDRESS {
                self.node_id = GATEWAY_ADDRESS;
                self.storage.save_node_id(GATEWAY_ADDRESS);
            }
        } else if let Some(id) = self.opts.node_id {
            if is_valid_node_id(id) && self.node_id != id {
                self.node_id = id;
                self.storage.save_node_id(id);
                self.emit(DebugEvent::StaticNodeId { id });
            }
        }

        if !self.radio.init() {
            self.emit(DebugEvent::TransportInitFailed);
            self.switch_state(State::Failure);
            return;
        }
        self.transport_active = true;
        self.radio.set_address(self.node_id);

        if self.opts.gateway {
            self.emit(DebugEvent::GatewayMode);
            self.set_parent(GATEWAY_ADDRESS, 0);
            self.switch_state(State::Ready);
        } else {
            self.switch_state(State::FindParent);
        }
    }

    fn st_find_parent_enter(&mut self) {
        if let Some(parent) = self.opts.parent {
            self.emit(DebugEvent::StaticParent { parent });
            self.set_parent(parent, 1);
            self.switch_state(State::RequestId);
            return;
        }
        self.finding_parent = true;
        self.preferred_parent_found = false;
        self.parent_candidate = None;
        // Unknown until the election commits; this also stops us from
        // answering other searches with a stale distance.
        self.distance = DISTANCE_INVALID;
        let mut request = Frame::internal(self.node_id, BROADCAST_ADDRESS, MSG_FIND_PARENT, 0);
        self.route_message(&mut request);
        self.emit(DebugEvent::FindParentRequestSent);
    }

    fn st_find_parent_update(&mut self) {
        if !self.preferred_parent_found && self.time_in_state() < STATE_TIMEOUT {
            return;
        }
        match self.parent_candidate {
            Some((parent, candidate_distance)) => {
                self.finding_parent = false;
                self.preferred_parent_found = false;
                let distance = candidate_distance + 1;
                self.set_parent(parent, distance);
                self.emit(DebugEvent::ParentSelected { parent, distance });
                self.switch_state(State::RequestId);
            }
            None => {
                self.emit(DebugEvent::FindParentNoReply);
                if self.retries < STATE_RETRIES {
                    self.switch_state(State::FindParent);
                } else {
                    self.switch_state(State::Failure);
                }
            }
        }
    }

    fn st_request_id_enter(&mut self) {
        if is_valid_node_id(self.node_id) {
            self.switch_state(State::VerifyUplink);
            return;
        }
        let mut request = Frame::internal(self.node_id, GATEWAY_ADDRESS, MSG_ID_REQUEST, 0);
        self.route_message(&mut request);
        self.emit(DebugEvent::IdRequested);
    }

    fn st_request_id_update(&mut self) {
        if is_valid_node_id(self.node_id) {
            self.switch_state(State::VerifyUplink);
            return;
        }
        if self.time_in_state() >= STATE_TIMEOUT {
            if self.retries < STATE_RETRIES {
                self.switch_state(State::RequestId);
            } else {
                self.switch_state(State::Failure);
            }
        }
    }

    /// Take a gateway-assigned id. 0 and 255 are unusable and count as a
    /// retry of the assignment; one rejection past the retry budget
    /// escalates like any other exhausted state.
    pub(crate) fn assign_node_id(&mut self, id: u8) -> bool {
        if !is_valid_node_id(id) {
            self.emit(DebugEvent::IdRejected { id });
            if self.retries < STATE_RETRIES {
                self.retries += 1;
            } else {
                self.switch_state(State::Failure);
            }
            return false;
        }
        self.node_id = id;
        self.storage.save_node_id(id);
        self.radio.set_address(id);
        self.emit(DebugEvent::IdAssigned { id });
        true
    }

    fn st_verify_uplink_enter(&mut self) {
        self.uplink_ok = false;
        self.last_uplink_check = self.clock.now();
        self.start_ping(GATEWAY_ADDRESS);
    }

    fn st_verify_uplink_update(&mut self) {
        if self.uplink_ok {
            self.failed_uplink_transmissions = 0;
            self.emit(DebugEvent::UplinkOk {
                hops: self.ping_response,
            });
            self.switch_state(State::Ready);
            return;
        }
        if self.time_in_state() >= STATE_TIMEOUT {
            self.ping_active = false;
            self.emit(DebugEvent::UplinkFailed);
            if self.retries < STATE_RETRIES {
                self.switch_state(State::VerifyUplink);
            } else {
                self.switch_state(State::Failure);
            }
        }
    }

    fn st_ready_enter(&mut self) {
        self.uplink_ok = true;
        self.failed_uplink_transmissions = 0;
    }

    fn st_ready_update(&mut self) {
        if self.opts.gateway {
            return;
        }
        let now = self.clock.now();

        // An uplink ping that never came back counts as a failed uplink
        // transmission.
        if self.ping_active && now.saturating_sub(self.ping_sent_at) >= STATE_TIMEOUT {
            self.ping_active = false;
            if self.ping_target == GATEWAY_ADDRESS {
                self.uplink_ok = false;
                self.bump_failed_uplink();
                self.emit(DebugEvent::UplinkFailed);
            }
        }

        let threshold = if self.table.is_repeater() {
            TRANSMISSION_FAILURES_REPEATER
        } else {
            TRANSMISSION_FAILURES_LEAF
        };
        if self.failed_uplink_transmissions >= threshold {
            if let Some(parent) = self.opts.parent {
                self.emit(DebugEvent::UplinkFailuresExceeded {
                    static_parent: true,
                });
                self.set_parent(parent, 1);
                self.failed_uplink_transmissions = 0;
            } else {
                self.emit(DebugEvent::UplinkFailuresExceeded {
                    static_parent: false,
                });
                self.switch_state(State::FindParent);
            }
        } else if self.failed_uplink_transmissions > 0 && !self.ping_active {
            // Sends are failing: confirm the uplink, rate-limited.
            self.check_uplink(false);
        }
    }

    fn st_failure_enter(&mut self) {
        self.uplink_ok = false;
        self.transport_active = false;
        self.ping_active = false;
        self.finding_parent = false;
        self.preferred_parent_found = false;
        self.emit(DebugEvent::PowerDown);
        self.radio.power_down();
    }

    fn st_failure_update(&mut self) {
        if self.time_in_state() >= FAILURE_RECOVERY_DELAY {
            self.emit(DebugEvent::ReInit);
            self.switch_state(State::Init);
        }
    }

    pub(crate) fn bump_failed_uplink(&mut self) {
        if self.failed_uplink_transmissions < FAILED_UPLINK_MAX {
            self.failed_uplink_transmissions += 1;
        }
    }

    /// Radio self-test, rate-limited. A failure is unrecoverable in place:
    /// the transport powers down and rejoins from scratch.
    pub(crate) fn maybe_sanity_check(&mut self) {
        if !self.transport_active {
            return;
        }
        let now = self.clock.now();
        if now.saturating_sub(self.last_sanity_check) < SANITY_CHECK_INTERVAL {
            return;
        }
        self.last_sanity_check = now;
        if self.radio.sanity_check() {
            self.emit(DebugEvent::SanityCheckOk);
        } else {
            self.emit(DebugEvent::SanityCheckFailed);
            self.switch_state(State::Failure);
        }
    }
}
