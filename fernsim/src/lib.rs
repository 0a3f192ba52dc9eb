//! fernsim - deterministic network simulator for fernlink.
//!
//! Runs whole fernlink meshes in a single process with simulated time, so
//! join, relay, and recovery behavior can be tested end to end without a
//! radio and without real-time delays.
//!
//! # Architecture
//!
//! - [`topology`] - device-level connectivity with per-direction link control
//! - [`net`] - the shared network plus the Radio/Storage/Clock drivers
//! - [`sim`] - the lock-step scheduler
//!
//! The core is synchronously polled, so there is no event queue: a tick
//! pumps every node's `process()` and advances the shared clock. Radio
//! `send` delivers into neighbor RX queues immediately and its return value
//! models the link-layer ack.
//!
//! # Example
//!
//! ```
//! use fernlink::{Duration, NodeOptions};
//! use fernsim::{Simulator, Topology};
//!
//! let mut sim = Simulator::new(Topology::fully_connected(2));
//! let gw = sim.add_node(NodeOptions::new().gateway());
//! let leaf = sim.add_node(NodeOptions::new().with_node_id(7));
//! sim.boot_all();
//! sim.run_for(Duration::from_secs(10), Duration::from_millis(100));
//! assert!(sim.node(gw).is_ready());
//! assert!(sim.node(leaf).is_ready());
//! ```

// Links the std critical-section implementation the fernlink channel needs
// on hosted targets.
use critical_section as _;

pub mod net;
pub mod sim;
pub mod topology;

pub use net::{Network, SimClock, SimRadio, SimStorage, VecEmitter};
pub use sim::{SimNode, SimTransport, Simulator};
pub use topology::{Link, Topology};

// Re-export what scenario tests keep reaching for.
pub use fernlink::{Duration, NodeOptions, State, Timestamp};
