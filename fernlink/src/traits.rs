//! Traits for the external collaborators of the transport core.
//!
//! The core is generic over:
//! - [`Radio`] - the packet radio driver (nRF24-class, LoRa, or simulated)
//! - [`Storage`] - persistence for identity, parent, distance, and routes
//! - [`Signer`] - the optional message signing module
//! - [`Clock`] - a monotonic millisecond time source
//!
//! All calls are blocking from the core's point of view; interrupt handling
//! stays inside the driver. For deterministic tests, see [`test_impls`].

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::time::Timestamp;
use crate::types::{Frame, NodeId, ROUTE_TABLE_SIZE, SIGNATURE_LEN};

/// Depth of the application-facing incoming queue.
pub const INCOMING_DEPTH: usize = 8;

/// Queue of frames addressed to this node's application layer. The driver
/// ISR side of the radio never touches this; only `process()` pushes.
pub type AppInChannel = Channel<CriticalSectionRawMutex, Frame, INCOMING_DEPTH>;

/// Packet radio driver.
pub trait Radio {
    /// Initialize the hardware. Called from the Init state and again after
    /// every Failure recovery.
    fn init(&mut self) -> bool;

    /// Set the receive address for this node.
    fn set_address(&mut self, address: NodeId);

    /// The currently configured receive address.
    fn address(&self) -> NodeId;

    /// Transmit `bytes` to `to`.
    ///
    /// Returns true only when the radio reports a link-layer acknowledgement
    /// from `to`, or unconditionally for the broadcast address (no ack is
    /// expected there).
    fn send(&mut self, to: NodeId, bytes: &[u8]) -> bool;

    /// True when the RX FIFO holds at least one frame.
    fn available(&self) -> bool;

    /// Pop one frame from the RX FIFO into `buf`, returning its length.
    fn receive(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Driver self-test: is the hardware still responsive?
    fn sanity_check(&mut self) -> bool;

    /// Power the radio down. Only `init` wakes it again.
    fn power_down(&mut self);
}

/// Persistent store for topology state. Reads of unprovisioned keys return
/// 255; writes are committed before returning.
pub trait Storage {
    fn load_node_id(&mut self) -> NodeId;
    fn save_node_id(&mut self, id: NodeId);

    fn load_parent(&mut self) -> NodeId;
    fn save_parent(&mut self, parent: NodeId);

    fn load_distance(&mut self) -> u8;
    fn save_distance(&mut self, distance: u8);

    /// Next hop stored for `destination` (1..=254).
    fn load_route(&mut self, destination: NodeId) -> NodeId;
    fn save_route(&mut self, destination: NodeId, next_hop: NodeId);

    /// Bulk write of the whole table. Used only by route clearing.
    fn save_route_table(&mut self, table: &[u8; ROUTE_TABLE_SIZE]);
}

/// Message signing module.
///
/// `data` is the signable region of a frame (see [`Frame::signable`]), which
/// excludes the per-hop last-hop byte so signatures survive relaying.
pub trait Signer {
    fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN];
    fn verify(&self, data: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool;
}

/// Signing disabled: never signs, rejects every signed frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSigning;

impl Signer for NoSigning {
    fn sign(&self, _data: &[u8]) -> [u8; SIGNATURE_LEN] {
        [0u8; SIGNATURE_LEN]
    }

    fn verify(&self, _data: &[u8], _signature: &[u8; SIGNATURE_LEN]) -> bool {
        false
    }
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

#[cfg(test)]
pub mod test_impls {
    //! Deterministic trait implementations for unit testing.

    use super::*;
    use crate::time::Duration;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec::Vec;

    /// Mock radio with a scripted RX queue and a TX log.
    pub struct MockRadio {
        pub address: NodeId,
        /// Result of the next `init()` calls.
        pub init_ok: bool,
        /// Link-layer ack result for unicast sends.
        pub ack: bool,
        /// Result of `sanity_check()`.
        pub sane: bool,
        pub powered_down: bool,
        pub rx_queue: VecDeque<Vec<u8>>,
        /// Every transmitted frame as (to, bytes).
        pub tx_log: Vec<(NodeId, Vec<u8>)>,
    }

    impl Default for MockRadio {
        fn default() -> Self {
            Self {
                address: crate::types::AUTO_ID,
                init_ok: true,
                ack: true,
                sane: true,
                powered_down: false,
                rx_queue: VecDeque::new(),
                tx_log: Vec::new(),
            }
        }
    }

    impl MockRadio {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an already-encoded frame for reception.
        pub fn push_rx(&mut self, bytes: &[u8]) {
            self.rx_queue.push_back(bytes.to_vec());
        }

        /// Queue a frame for reception.
        pub fn push_frame(&mut self, frame: &Frame) {
            self.rx_queue.push_back(frame.encode_to_vec());
        }

        /// Decode the last transmitted frame.
        pub fn last_sent(&self) -> Option<(NodeId, Frame)> {
            self.tx_log
                .last()
                .map(|(to, bytes)| (*to, Frame::decode(bytes).unwrap()))
        }
    }

    impl Radio for MockRadio {
        fn init(&mut self) -> bool {
            if self.init_ok {
                self.powered_down = false;
            }
            self.init_ok
        }

        fn set_address(&mut self, address: NodeId) {
            self.address = address;
        }

        fn address(&self) -> NodeId {
            self.address
        }

        fn send(&mut self, to: NodeId, bytes: &[u8]) -> bool {
            self.tx_log.push((to, bytes.to_vec()));
            to == crate::types::BROADCAST_ADDRESS || self.ack
        }

        fn available(&self) -> bool {
            !self.rx_queue.is_empty()
        }

        fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
            let data = self.rx_queue.pop_front()?;
            let len = data.len().min(buf.len());
            buf[..len].copy_from_slice(&data[..len]);
            Some(len)
        }

        fn sanity_check(&mut self) -> bool {
            self.sane
        }

        fn power_down(&mut self) {
            self.powered_down = true;
        }
    }

    /// In-memory store. Counts writes so tests can assert on persistence.
    pub struct MemoryStorage {
        pub node_id: NodeId,
        pub parent: NodeId,
        pub distance: u8,
        pub routes: [u8; ROUTE_TABLE_SIZE],
        pub writes: u32,
    }

    impl Default for MemoryStorage {
        fn default() -> Self {
            Self {
                node_id: 255,
                parent: 255,
                distance: 255,
                routes: [255; ROUTE_TABLE_SIZE],
                writes: 0,
            }
        }
    }

    impl MemoryStorage {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Storage for MemoryStorage {
        fn load_node_id(&mut self) -> NodeId {
            self.node_id
        }

        fn save_node_id(&mut self, id: NodeId) {
            self.node_id = id;
            self.writes += 1;
        }

        fn load_parent(&mut self) -> NodeId {
            self.parent
        }

        fn save_parent(&mut self, parent: NodeId) {
            self.parent = parent;
            self.writes += 1;
        }

        fn load_distance(&mut self) -> u8 {
            self.distance
        }

        fn save_distance(&mut self, distance: u8) {
            self.distance = distance;
            self.writes += 1;
        }

        fn load_route(&mut self, destination: NodeId) -> NodeId {
            self.routes[destination as usize - 1]
        }

        fn save_route(&mut self, destination: NodeId, next_hop: NodeId) {
            self.routes[destination as usize - 1] = next_hop;
            self.writes += 1;
        }

        fn save_route_table(&mut self, table: &[u8; ROUTE_TABLE_SIZE]) {
            self.routes = *table;
            self.writes += 1;
        }
    }

    /// Shared settable clock. Clones observe the same time, so a test can
    /// keep a handle while the node owns its copy.
    ///
    /// With a non-zero `step`, every `now()` read advances time - this makes
    /// bounded in-stack waits (`transport_wait`) terminate in tests.
    #[derive(Clone)]
    pub struct MockClock {
        now_ms: Rc<Cell<u64>>,
        step_ms: u64,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self {
                now_ms: Rc::new(Cell::new(0)),
                step_ms: 0,
            }
        }

        pub fn with_step(step_ms: u64) -> Self {
            Self {
                now_ms: Rc::new(Cell::new(0)),
                step_ms,
            }
        }

        pub fn advance(&self, d: Duration) {
            self.now_ms.set(self.now_ms.get() + d.as_millis());
        }

        pub fn set(&self, t: Timestamp) {
            self.now_ms.set(t.as_millis());
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Timestamp {
            let now = self.now_ms.get();
            if self.step_ms > 0 {
                self.now_ms.set(now + self.step_ms);
            }
            Timestamp::from_millis(now)
        }
    }

    /// Deterministic signer for testing (not cryptographically secure).
    #[derive(Clone, Copy)]
    pub struct XorSigner {
        pub key: u8,
    }

    impl XorSigner {
        pub fn new(key: u8) -> Self {
            Self { key }
        }
    }

    impl Signer for XorSigner {
        fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_LEN] {
            let mut sig = [self.key; SIGNATURE_LEN];
            for (i, &byte) in data.iter().enumerate() {
                sig[i % SIGNATURE_LEN] ^= byte;
                sig[(i + 7) % SIGNATURE_LEN] = sig[(i + 7) % SIGNATURE_LEN].wrapping_add(byte);
            }
            sig
        }

        fn verify(&self, data: &[u8], signature: &[u8; SIGNATURE_LEN]) -> bool {
            self.sign(data) == *signature
        }
    }
}
