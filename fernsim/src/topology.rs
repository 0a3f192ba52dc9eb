//! Network topology and link control.
//!
//! Connectivity is defined between *devices* (stable simulator handles),
//! not node addresses - a node's radio address changes when the gateway
//! assigns it an id, but its physical neighborhood does not.

use hashbrown::HashMap;

/// A directional radio link between two devices.
#[derive(Debug, Clone, Copy)]
pub struct Link {
    /// Whether frames currently get through.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self { active: true }
    }
}

/// Connectivity between devices. Links are directional internally;
/// [`Topology::add_link`] wires both directions.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(usize, usize), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect two devices in both directions.
    pub fn add_link(&mut self, a: usize, b: usize) {
        self.links.insert((a, b), Link::default());
        self.links.insert((b, a), Link::default());
    }

    /// Create a chain topology (each device sees only its neighbors).
    pub fn chain(devices: &[usize]) -> Self {
        let mut topo = Self::new();
        for window in devices.windows(2) {
            topo.add_link(window[0], window[1]);
        }
        topo
    }

    /// Create a star topology (first device is the hub).
    pub fn star(devices: &[usize]) -> Self {
        let mut topo = Self::new();
        if let Some((&hub, spokes)) = devices.split_first() {
            for &spoke in spokes {
                topo.add_link(hub, spoke);
            }
        }
        topo
    }

    /// Create a fully connected topology over `count` devices.
    pub fn fully_connected(count: usize) -> Self {
        let mut topo = Self::new();
        for a in 0..count {
            for b in a + 1..count {
                topo.add_link(a, b);
            }
        }
        topo
    }

    /// True when frames flow from `a` to `b`.
    pub fn linked(&self, a: usize, b: usize) -> bool {
        self.links.get(&(a, b)).map(|l| l.active).unwrap_or(false)
    }

    /// Enable or disable one direction of a link.
    pub fn set_active(&mut self, from: usize, to: usize, active: bool) {
        if let Some(link) = self.links.get_mut(&(from, to)) {
            link.active = active;
        }
    }

    /// Enable or disable both directions of a link.
    pub fn set_active_both(&mut self, a: usize, b: usize, active: bool) {
        self.set_active(a, b, active);
        self.set_active(b, a, active);
    }
}
