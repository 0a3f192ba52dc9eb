//! Message processing and routing.
//!
//! [`Node::process_fifo`] drains the radio's RX FIFO (at most
//! [`MAX_SUBSEQ_MSGS`] frames per tick, so the state machine is never
//! starved) and classifies each frame: addressed to us, broadcast, or to be
//! relayed. Outbound traffic funnels through [`Node::route_message`], which
//! picks the next hop, and [`Node::send_write`], which stamps the per-hop
//! header fields, signs where required, and talks to the radio.

use crate::debug::DebugEvent;
use crate::fsm::State;
use crate::node::Node;
use crate::traits::{Clock, Radio, Signer, Storage};
use crate::types::{
    is_valid_distance, Command, Frame, BROADCAST_ADDRESS, FAILED_UPLINK_MAX, GATEWAY_ADDRESS,
    MAX_FRAME_LEN, MAX_HOPS, MAX_SUBSEQ_MSGS, MSG_FIND_PARENT, MSG_FIND_PARENT_RESPONSE,
    MSG_ID_REQUEST, MSG_ID_RESPONSE, MSG_PING, MSG_PONG,
};
use crate::wire::DecodeError;

impl<R, S, G, C> Node<R, S, G, C>
where
    R: Radio,
    S: Storage,
    G: Signer,
    C: Clock,
{
    /// Drain up to [`MAX_SUBSEQ_MSGS`] frames from the RX FIFO.
    pub(crate) fn process_fifo(&mut self) {
        for _ in 0..MAX_SUBSEQ_MSGS {
            if !self.radio.available() {
                break;
            }
            self.process_message();
        }
    }

    /// Receive and act on a single frame.
    fn process_message(&mut self) {
        let mut buf = [0u8; MAX_FRAME_LEN];
        let Some(len) = self.radio.receive(&mut buf) else {
            return;
        };
        let frame = match Frame::decode(&buf[..len]) {
            Ok(frame) => frame,
            Err(DecodeError::VersionMismatch { got }) => {
                self.metrics.dropped += 1;
                self.emit(DebugEvent::VersionMismatch { got });
                return;
            }
            Err(error) => {
                self.metrics.dropped += 1;
                self.emit(DebugEvent::DecodeFailed { error });
                return;
            }
        };
        self.metrics.received += 1;
        self.emit(DebugEvent::MessageRead {
            sender: frame.sender,
            last_hop: frame.last_hop,
            destination: frame.destination,
            command: frame.command,
            msg_type: frame.msg_type,
        });

        if let Some(signature) = &frame.signature {
            let mut scratch = [0u8; MAX_FRAME_LEN];
            if !self.signer.verify(frame.signable(&mut scratch), signature) {
                self.metrics.dropped += 1;
                self.emit(DebugEvent::SignatureVerifyFailed {
                    sender: frame.sender,
                });
                return;
            }
        }

        // Back-route learning: a relayed frame tells us how to reach its
        // sender. No-op on leaves.
        if frame.sender != frame.last_hop && frame.sender != self.node_id {
            self.learn_route(frame.sender, frame.last_hop);
        }

        if frame.destination == self.node_id {
            self.last_received = Some((frame.command, frame.msg_type));
            self.handle_addressed(frame);
        } else if frame.destination == BROADCAST_ADDRESS {
            self.last_received = Some((frame.command, frame.msg_type));
            self.handle_broadcast(frame);
        } else {
            self.handle_relay(frame);
        }
    }

    /// A frame addressed to this node.
    fn handle_addressed(&mut self, frame: Frame) {
        if frame.is_ack {
            // Acknowledgement echoes go straight to the application.
            self.emit(DebugEvent::AckReceived {
                from: frame.sender,
            });
            self.deliver_to_app(frame);
            return;
        }
        if frame.ack_request {
            self.emit(DebugEvent::AckRequested {
                from: frame.sender,
            });
            let mut echo = frame.clone();
            echo.is_ack = true;
            echo.ack_request = false;
            echo.destination = frame.sender;
            echo.sender = self.node_id;
            echo.signature = None;
            self.route_message(&mut echo);
        }
        self.dispatch_local(frame);
    }

    /// Local processing shared by addressed and broadcast frames.
    fn dispatch_local(&mut self, frame: Frame) {
        if frame.command == Command::Internal {
            self.handle_internal(frame);
        } else {
            self.deliver_to_app(frame);
        }
    }

    /// Transport-internal control frames. Internal types the transport does
    /// not own pass through to the application unchanged.
    fn handle_internal(&mut self, frame: Frame) {
        match frame.msg_type {
            MSG_FIND_PARENT => {
                self.emit(DebugEvent::FindParentRequestFrom {
                    from: frame.sender,
                });
                // Nodes without a usable distance stay silent.
                if is_valid_distance(self.distance) && !self.finding_parent {
                    let mut response = Frame::internal(
                        self.node_id,
                        frame.sender,
                        MSG_FIND_PARENT_RESPONSE,
                        self.distance,
                    );
                    // One hop by definition: answer the neighbor directly.
                    self.send_write(frame.sender, &mut response);
                }
            }
            MSG_FIND_PARENT_RESPONSE => self.handle_find_parent_response(frame),
            MSG_ID_REQUEST => {
                // Only the gateway terminates id requests; the controller
                // behind the application queue does the assigning.
                if self.opts.gateway {
                    self.deliver_to_app(frame);
                }
            }
            MSG_ID_RESPONSE => {
                if self.state == State::RequestId {
                    self.assign_node_id(frame.value());
                }
            }
            MSG_PING => {
                let hops = frame.value();
                self.emit(DebugEvent::Pinged {
                    from: frame.sender,
                    hops,
                });
                let mut pong = Frame::internal(
                    self.node_id,
                    frame.sender,
                    MSG_PONG,
                    hops.saturating_add(1).min(MAX_HOPS),
                );
                self.route_message(&mut pong);
            }
            MSG_PONG => {
                let hops = frame.value();
                self.emit(DebugEvent::PongReceived { hops });
                if self.ping_active {
                    self.ping_response = hops;
                    self.ping_active = false;
                    if self.ping_target == GATEWAY_ADDRESS {
                        self.uplink_ok = true;
                        if is_valid_distance(hops) && hops != self.distance {
                            self.emit(DebugEvent::TopologyChanged {
                                old_distance: self.distance,
                                new_distance: hops,
                            });
                            self.distance = hops;
                            self.storage.save_distance(hops);
                        }
                    }
                }
            }
            _ => self.deliver_to_app(frame),
        }
    }

    fn handle_find_parent_response(&mut self, frame: Frame) {
        if !self.finding_parent {
            self.emit(DebugEvent::FindParentInactive);
            return;
        }
        let distance = frame.value();
        self.emit(DebugEvent::FindParentResponse {
            from: frame.sender,
            distance,
        });
        if self.preferred_parent_found {
            return;
        }
        // Unreachable responders are useless; MAX_HOPS itself is out too,
        // or our committed distance would hit the invalid sentinel.
        if distance >= MAX_HOPS {
            return;
        }
        let better = match self.parent_candidate {
            None => true,
            // Strict: ties keep the first arrival.
            Some((_, best)) => distance < best,
        };
        if better {
            self.parent_candidate = Some((frame.sender, distance));
        }
        // The parent we already trusted wins outright when it is at least
        // as close as the best candidate so far.
        if frame.sender == self.parent_node_id {
            let best = self.parent_candidate.map(|(_, d)| d).unwrap_or(distance);
            if distance <= best {
                self.parent_candidate = Some((frame.sender, distance));
                self.preferred_parent_found = true;
                self.emit(DebugEvent::PreferredParentFound);
            }
        }
    }

    /// A broadcast frame: process locally, and re-broadcast once on
    /// repeaters. Only frames heard directly from their originator are
    /// forwarded (the header has no TTL; this bounds the flood). The
    /// find-parent exchange never is: the election must stay one-hop, in
    /// both directions.
    fn handle_broadcast(&mut self, frame: Frame) {
        if frame.sender == self.node_id {
            return;
        }
        if self.table.is_repeater()
            && frame.sender == frame.last_hop
            && !frame.is_internal(MSG_FIND_PARENT)
            && !frame.is_internal(MSG_FIND_PARENT_RESPONSE)
        {
            self.emit(DebugEvent::BroadcastForwarded {
                msg_type: frame.msg_type,
            });
            self.metrics.forwarded += 1;
            let mut forward = frame.clone();
            self.send_write(BROADCAST_ADDRESS, &mut forward);
        }
        self.dispatch_local(frame);
    }

    /// A frame for some other node. Repeaters forward it; leaves drop it.
    fn handle_relay(&mut self, mut frame: Frame) {
        if !self.table.is_repeater() {
            self.metrics.dropped += 1;
            self.emit(DebugEvent::RelayDenied {
                destination: frame.destination,
            });
            return;
        }
        // Learn the way back even when the sender is a direct neighbor;
        // downlink replies will need it.
        if frame.sender != self.node_id {
            self.learn_route(frame.sender, frame.last_hop);
        }
        if frame.is_internal(MSG_PING) {
            let hops = frame.value().saturating_add(1).min(MAX_HOPS);
            frame.set_value(hops);
            self.emit(DebugEvent::RelayPing { hops });
        }
        self.emit(DebugEvent::RelayMessage {
            destination: frame.destination,
        });
        self.metrics.forwarded += 1;
        self.route_message(&mut frame);
    }

    fn learn_route(&mut self, destination: u8, next_hop: u8) {
        if self.table.set(destination, next_hop, &mut self.storage) {
            self.emit(DebugEvent::RouteLearned {
                destination,
                next_hop,
            });
        }
    }

    /// Pick the next hop for `frame` and transmit. No transport-state check:
    /// the state machine itself sends through here before Ready.
    ///
    /// Unicast results feed the failed-uplink counter on non-gateway nodes;
    /// broadcasts carry no ack and touch nothing.
    pub(crate) fn route_message(&mut self, frame: &mut Frame) -> bool {
        let destination = frame.destination;
        if self.finding_parent && destination != BROADCAST_ADDRESS {
            self.emit(DebugEvent::ParentSearchActive);
            return false;
        }

        let route = if destination == BROADCAST_ADDRESS {
            BROADCAST_ADDRESS
        } else if destination == GATEWAY_ADDRESS || destination == self.parent_node_id {
            self.parent_node_id
        } else if self.table.is_repeater() {
            match self.table.lookup(destination) {
                Some(hop) => hop,
                None => {
                    self.emit(DebugEvent::RouteUnknown { destination });
                    self.parent_node_id
                }
            }
        } else {
            // Leaves send everything through their parent.
            self.parent_node_id
        };

        if destination != BROADCAST_ADDRESS
            && (route == self.node_id || route == BROADCAST_ADDRESS)
        {
            // No usable next hop (typically a gateway with no learned route).
            self.metrics.dropped += 1;
            self.emit(DebugEvent::RouteUnknown { destination });
            return false;
        }

        let ok = self.send_write(route, frame);
        if !self.opts.gateway && destination != BROADCAST_ADDRESS {
            if ok {
                self.failed_uplink_transmissions = 0;
            } else {
                self.bump_failed_uplink();
            }
        }
        ok
    }

    /// Stamp the per-hop header fields, sign if this node originates the
    /// frame and signing is on, encode, and hand to the radio.
    pub(crate) fn send_write(&mut self, to: u8, frame: &mut Frame) -> bool {
        frame.last_hop = self.node_id;
        frame.failed_uplink = self.failed_uplink_transmissions.min(FAILED_UPLINK_MAX);

        if self.opts.sign_outbound
            && to != BROADCAST_ADDRESS
            && frame.sender == self.node_id
            && frame.signature.is_none()
        {
            let mut scratch = [0u8; MAX_FRAME_LEN];
            let signature = self.signer.sign(frame.signable(&mut scratch));
            frame.signature = Some(signature);
        }

        let mut buf = [0u8; MAX_FRAME_LEN];
        let len = frame.encode(&mut buf);
        let ok = self.radio.send(to, &buf[..len]);
        self.metrics.sent += 1;
        if !ok {
            self.metrics.send_failures += 1;
        }
        self.emit(DebugEvent::MessageSent {
            to,
            destination: frame.destination,
            command: frame.command,
            msg_type: frame.msg_type,
            ok,
        });
        ok
    }

    /// Queue a frame for the application. A full queue drops the frame.
    fn deliver_to_app(&mut self, frame: Frame) {
        match self.app_incoming.try_send(frame) {
            Ok(()) => self.metrics.delivered += 1,
            Err(_) => {
                self.metrics.dropped += 1;
                self.emit(DebugEvent::AppQueueFull);
            }
        }
    }
}
