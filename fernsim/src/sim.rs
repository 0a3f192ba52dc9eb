//! Lock-step scheduler.
//!
//! The transport core is synchronously polled, so the simulator needs no
//! event queue: one `tick` pumps every node's `process()` against the
//! current shared time, then advances the clock. Radio delivery happens
//! inside the pumped calls (see [`crate::net`]), which keeps runs fully
//! deterministic - same setup, same tick order, same outcome.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fernlink::debug::DebugEvent;
use fernlink::{Duration, Node, NodeOptions, NoSigning, Timestamp};

use crate::net::{Network, SharedNetwork, SimClock, SimRadio, SimStorage, VecEmitter};
use crate::topology::Topology;

/// A fernlink node as instantiated by the simulator.
pub type SimTransport = Node<SimRadio, SimStorage, NoSigning, SimClock>;

/// One simulated node: the transport plus its collected debug events.
pub struct SimNode {
    pub node: SimTransport,
    pub events: Arc<Mutex<Vec<DebugEvent>>>,
    pub device: usize,
}

/// Multi-node simulator over a shared network.
pub struct Simulator {
    shared: SharedNetwork,
    now_ms: Arc<AtomicU64>,
    nodes: Vec<SimNode>,
}

impl Simulator {
    pub fn new(topology: Topology) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Network::new(topology))),
            now_ms: Arc::new(AtomicU64::new(0)),
            nodes: Vec::new(),
        }
    }

    /// Add a node with empty persistent storage. Returns its index, which is
    /// also its device handle in the topology.
    pub fn add_node(&mut self, opts: NodeOptions) -> usize {
        self.add_node_with_storage(opts, SimStorage::new())
    }

    /// Add a node with pre-provisioned storage.
    pub fn add_node_with_storage(&mut self, opts: NodeOptions, storage: SimStorage) -> usize {
        let device = self.shared.lock().unwrap().add_device();
        let radio = SimRadio::new(device, self.shared.clone());
        let clock = SimClock::new(self.now_ms.clone());
        let mut node = Node::new(radio, storage, NoSigning, clock, opts);
        let events = Arc::new(Mutex::new(Vec::new()));
        node.set_debug_emitter(Box::new(VecEmitter::new(events.clone())));
        self.nodes.push(SimNode {
            node,
            events,
            device,
        });
        device
    }

    /// Initialize one node (radio bring-up, state machine entry).
    pub fn boot(&mut self, idx: usize) {
        self.nodes[idx].node.initialize();
    }

    pub fn boot_all(&mut self) {
        for node in &mut self.nodes {
            node.node.initialize();
        }
    }

    /// One tick: pump every node, then advance the clock by `step`.
    pub fn tick(&mut self, step: Duration) {
        for node in &mut self.nodes {
            node.node.process();
        }
        self.now_ms.fetch_add(step.as_millis(), Ordering::Relaxed);
    }

    /// Run ticks of `step` until `duration` has elapsed.
    pub fn run_for(&mut self, duration: Duration, step: Duration) {
        let deadline = self.current_time() + duration;
        while self.current_time() < deadline {
            self.tick(step);
        }
    }

    pub fn current_time(&self) -> Timestamp {
        Timestamp::from_millis(self.now_ms.load(Ordering::Relaxed))
    }

    pub fn node(&self, idx: usize) -> &SimTransport {
        &self.nodes[idx].node
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut SimTransport {
        &mut self.nodes[idx].node
    }

    /// Snapshot of a node's debug events so far.
    pub fn events(&self, idx: usize) -> Vec<DebugEvent> {
        self.nodes[idx].events.lock().unwrap().clone()
    }

    /// Enable or disable both directions of a link between two devices.
    pub fn set_link_active(&mut self, a: usize, b: usize, active: bool) {
        self.shared
            .lock()
            .unwrap()
            .topology
            .set_active_both(a, b, active);
    }

    /// Rig a device's radio self-test result.
    pub fn set_sane(&mut self, device: usize, sane: bool) {
        self.shared.lock().unwrap().devices[device].sane = sane;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_per_tick() {
        let mut sim = Simulator::new(Topology::new());
        sim.add_node(NodeOptions::new().gateway());
        sim.boot_all();
        sim.tick(Duration::from_millis(100));
        sim.tick(Duration::from_millis(100));
        assert_eq!(sim.current_time(), Timestamp::from_millis(200));
    }

    #[test]
    fn lone_gateway_is_ready_and_stays_ready() {
        let mut sim = Simulator::new(Topology::new());
        let gw = sim.add_node(NodeOptions::new().gateway());
        sim.boot_all();
        sim.run_for(Duration::from_secs(60), Duration::from_millis(100));
        assert!(sim.node(gw).is_ready());
        assert_eq!(sim.node(gw).distance(), 0);
    }
}
