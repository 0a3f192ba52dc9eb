//! fernlink - self-healing tree-mesh transport for sensor networks
//!
//! A transport core for small-payload radio meshes rooted at a gateway.
//! Nodes join the tree by electing a parent, obtain an id from the gateway
//! when they have none, verify the uplink by pinging the root, and then
//! route application traffic through repeater nodes - recovering on their
//! own when the radio or the topology fails.
//!
//! # Key Properties
//!
//! - Six-state lifecycle: Init, FindParent, RequestId, VerifyUplink,
//!   Ready, Failure - with bounded retries and automatic recovery
//! - Hop-limited relaying over a persisted routing table (repeaters only)
//! - Single-threaded and cooperative: one `process()` tick drains the RX
//!   FIFO, runs the state machine, and never blocks unboundedly
//! - Deterministic: all timing flows through an injected [`Clock`], so the
//!   whole stack runs under simulation (see the fernsim crate)
//! - Optional frame signing through an injected [`Signer`]
//!
//! # Example
//!
//! ```no_run
//! use fernlink::{Node, NodeOptions};
//!
//! // Implement Radio, Storage, Signer, and Clock for your platform...
//!
//! // let mut node = Node::new(radio, storage, signer, clock,
//! //     NodeOptions::new().repeater());
//! // node.initialize();
//! // loop {
//! //     node.process();
//! //     while let Ok(frame) = node.incoming().try_receive() {
//! //         // Handle application frames
//! //     }
//! // }
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - constants, frame model, metrics
//! - [`wire`] - wire format serialization
//! - [`traits`] - Radio, Storage, Signer, Clock traits
//! - [`table`] - destination -> next-hop routing table
//! - [`config`] - node construction options
//! - [`fsm`] - the transport state machine
//! - [`routing`] - message processing and forwarding
//! - [`node`] - the Node struct and public API
//! - [`debug`] - structured protocol trace events

#![cfg_attr(not(test), no_std)]

extern crate alloc;

// Hosted test builds need a critical-section implementation for the
// embassy-sync channel; the std one comes from the dev-dependency.
#[cfg(test)]
use critical_section as _;

pub mod config;
pub mod debug;
pub mod fsm;
pub mod node;
pub mod routing;
pub mod table;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::NodeOptions;
pub use fsm::State;
pub use node::Node;
pub use table::RouteTable;
pub use time::{Duration, Timestamp};
pub use traits::{AppInChannel, Clock, NoSigning, Radio, Signer, Storage};
pub use types::{Command, Frame, NodeId, TransportMetrics};
pub use wire::DecodeError;

// Re-export constants
pub use types::{
    AUTO_ID, BROADCAST_ADDRESS, DISTANCE_INVALID, GATEWAY_ADDRESS, INVALID_HOPS, MAX_HOPS,
    MAX_PAYLOAD, PROTOCOL_VERSION,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::{MemoryStorage, MockClock, MockRadio};

    #[test]
    fn fresh_node_is_inert() {
        let node = Node::new(
            MockRadio::new(),
            MemoryStorage::new(),
            NoSigning,
            MockClock::new(),
            NodeOptions::new(),
        );
        assert!(!node.is_ready());
        assert!(!node.is_searching_parent());
        assert_eq!(node.node_id(), AUTO_ID);
        assert_eq!(node.distance(), DISTANCE_INVALID);
    }

    #[test]
    fn gateway_is_ready_after_initialize() {
        let mut node = Node::new(
            MockRadio::new(),
            MemoryStorage::new(),
            NoSigning,
            MockClock::new(),
            NodeOptions::new().gateway(),
        );
        node.initialize();
        assert!(node.is_ready());
        assert_eq!(node.node_id(), GATEWAY_ADDRESS);
        assert_eq!(node.distance(), 0);
        assert!(node.is_repeater());
    }
}
