//! The shared in-memory network and the driver implementations backed by it.
//!
//! Every simulated node gets a [`SimRadio`] holding a handle to one shared
//! [`Network`]. `send` delivers synchronously into the RX queues of the
//! devices in range, and its return value models the link-layer ack: true
//! when a powered device with the destination address heard the frame (or
//! always, for broadcasts - no ack exists there).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fernlink::debug::{DebugEmitter, DebugEvent};
use fernlink::traits::{Clock, Radio, Storage};
use fernlink::types::ROUTE_TABLE_SIZE;
use fernlink::{NodeId, Timestamp, BROADCAST_ADDRESS};

use crate::topology::Topology;

/// Radio-visible state of one device.
pub struct DeviceState {
    /// Currently configured receive address.
    pub address: NodeId,
    /// False before `init` and after `power_down`.
    pub powered: bool,
    /// Result the device's self-test will report.
    pub sane: bool,
    /// RX FIFO.
    pub rx: VecDeque<Vec<u8>>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            powered: false,
            sane: true,
            rx: VecDeque::new(),
        }
    }
}

/// All devices plus the topology connecting them.
pub struct Network {
    pub devices: Vec<DeviceState>,
    pub topology: Topology,
}

impl Network {
    pub fn new(topology: Topology) -> Self {
        Self {
            devices: Vec::new(),
            topology,
        }
    }

    pub fn add_device(&mut self) -> usize {
        self.devices.push(DeviceState::new());
        self.devices.len() - 1
    }

    /// Deliver `bytes` from device `from` to everyone in range. Returns the
    /// ack: true for broadcasts, else whether the addressee heard it.
    fn deliver(&mut self, from: usize, to: NodeId, bytes: &[u8]) -> bool {
        let mut acked = false;
        for idx in 0..self.devices.len() {
            if idx == from || !self.topology.linked(from, idx) {
                continue;
            }
            let device = &mut self.devices[idx];
            if !device.powered {
                continue;
            }
            if to == BROADCAST_ADDRESS || device.address == to {
                device.rx.push_back(bytes.to_vec());
                acked = true;
            }
        }
        to == BROADCAST_ADDRESS || acked
    }
}

/// Shared handle to the network.
pub type SharedNetwork = Arc<Mutex<Network>>;

/// [`Radio`] implementation over the shared network.
pub struct SimRadio {
    device: usize,
    shared: SharedNetwork,
}

impl SimRadio {
    pub fn new(device: usize, shared: SharedNetwork) -> Self {
        Self { device, shared }
    }
}

impl Radio for SimRadio {
    fn init(&mut self) -> bool {
        let mut net = self.shared.lock().unwrap();
        net.devices[self.device].powered = true;
        true
    }

    fn set_address(&mut self, address: NodeId) {
        self.shared.lock().unwrap().devices[self.device].address = address;
    }

    fn address(&self) -> NodeId {
        self.shared.lock().unwrap().devices[self.device].address
    }

    fn send(&mut self, to: NodeId, bytes: &[u8]) -> bool {
        let mut net = self.shared.lock().unwrap();
        if !net.devices[self.device].powered {
            return false;
        }
        net.deliver(self.device, to, bytes)
    }

    fn available(&self) -> bool {
        let net = self.shared.lock().unwrap();
        let device = &net.devices[self.device];
        device.powered && !device.rx.is_empty()
    }

    fn receive(&mut self, buf: &mut [u8]) -> Option<usize> {
        let mut net = self.shared.lock().unwrap();
        let data = net.devices[self.device].rx.pop_front()?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Some(len)
    }

    fn sanity_check(&mut self) -> bool {
        self.shared.lock().unwrap().devices[self.device].sane
    }

    fn power_down(&mut self) {
        let mut net = self.shared.lock().unwrap();
        let device = &mut net.devices[self.device];
        device.powered = false;
        device.rx.clear();
    }
}

/// [`Clock`] reading a shared millisecond counter advanced by the scheduler.
#[derive(Clone)]
pub struct SimClock {
    now_ms: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new(now_ms: Arc<AtomicU64>) -> Self {
        Self { now_ms }
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::Relaxed))
    }
}

/// In-memory [`Storage`]. Public fields so tests can pre-provision and
/// inspect persisted state.
pub struct SimStorage {
    pub node_id: NodeId,
    pub parent: NodeId,
    pub distance: u8,
    pub routes: [u8; ROUTE_TABLE_SIZE],
}

impl Default for SimStorage {
    fn default() -> Self {
        Self {
            node_id: 255,
            parent: 255,
            distance: 255,
            routes: [255; ROUTE_TABLE_SIZE],
        }
    }
}

impl SimStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for SimStorage {
    fn load_node_id(&mut self) -> NodeId {
        self.node_id
    }

    fn save_node_id(&mut self, id: NodeId) {
        self.node_id = id;
    }

    fn load_parent(&mut self) -> NodeId {
        self.parent
    }

    fn save_parent(&mut self, parent: NodeId) {
        self.parent = parent;
    }

    fn load_distance(&mut self) -> u8 {
        self.distance
    }

    fn save_distance(&mut self, distance: u8) {
        self.distance = distance;
    }

    fn load_route(&mut self, destination: NodeId) -> NodeId {
        self.routes[destination as usize - 1]
    }

    fn save_route(&mut self, destination: NodeId, next_hop: NodeId) {
        self.routes[destination as usize - 1] = next_hop;
    }

    fn save_route_table(&mut self, table: &[u8; ROUTE_TABLE_SIZE]) {
        self.routes = *table;
    }
}

/// Debug emitter that collects events into a shared Vec, so the test keeps
/// access while the node owns the emitter.
pub struct VecEmitter {
    events: Arc<Mutex<Vec<DebugEvent>>>,
}

impl VecEmitter {
    pub fn new(events: Arc<Mutex<Vec<DebugEvent>>>) -> Self {
        Self { events }
    }
}

impl DebugEmitter for VecEmitter {
    fn emit(&mut self, event: DebugEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unicast_ack_requires_listener() {
        let mut net = Network::new(Topology::fully_connected(2));
        let a = net.add_device();
        let b = net.add_device();
        net.devices[a].powered = true;

        // Nobody listens on address 5 yet.
        assert!(!net.deliver(a, 5, &[1, 2, 3]));

        net.devices[b].powered = true;
        net.devices[b].address = 5;
        assert!(net.deliver(a, 5, &[1, 2, 3]));
        assert_eq!(net.devices[b].rx.len(), 1);
    }

    #[test]
    fn broadcast_needs_no_ack() {
        let mut net = Network::new(Topology::new()); // no links at all
        let a = net.add_device();
        net.devices[a].powered = true;
        assert!(net.deliver(a, BROADCAST_ADDRESS, &[9]));
    }

    #[test]
    fn powered_down_devices_hear_nothing() {
        let mut net = Network::new(Topology::fully_connected(2));
        let a = net.add_device();
        let b = net.add_device();
        net.devices[a].powered = true;
        net.devices[b].address = 5;
        assert!(!net.deliver(a, 5, &[1]));
        assert!(net.devices[b].rx.is_empty());
    }
}
