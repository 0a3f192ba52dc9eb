//! Routing table: destination node id -> next hop.
//!
//! Only repeater-capable nodes keep the table; leaves route everything
//! through their parent. The capability is fixed when the node is built, so
//! the rest of the core never branches on it - it just calls into whichever
//! variant it holds.

use crate::traits::Storage;
use crate::types::{NodeId, BROADCAST_ADDRESS, GATEWAY_ADDRESS, ROUTE_NONE, ROUTE_TABLE_SIZE};

/// Next-hop table for destinations 1..=254, dense, indexed by node id.
/// An entry of [`ROUTE_NONE`] means "no route known".
pub enum RouteTable {
    Repeater { next_hop: [u8; ROUTE_TABLE_SIZE] },
    /// Leaves never learn routes: lookups miss, writes are no-ops.
    Leaf,
}

impl RouteTable {
    pub fn new(repeater: bool) -> Self {
        if repeater {
            RouteTable::Repeater {
                next_hop: [ROUTE_NONE; ROUTE_TABLE_SIZE],
            }
        } else {
            RouteTable::Leaf
        }
    }

    /// True when this node forwards on behalf of others.
    pub fn is_repeater(&self) -> bool {
        matches!(self, RouteTable::Repeater { .. })
    }

    /// Next hop for `destination`, if one is known.
    pub fn lookup(&self, destination: NodeId) -> Option<NodeId> {
        let RouteTable::Repeater { next_hop } = self else {
            return None;
        };
        if !routable(destination) {
            return None;
        }
        match next_hop[destination as usize - 1] {
            ROUTE_NONE => None,
            hop => Some(hop),
        }
    }

    /// Record `destination -> hop`, overwriting any previous entry and
    /// persisting the single slot. Unchanged entries are not rewritten
    /// (EEPROM-class stores wear out). Returns true when the entry changed.
    pub fn set<S: Storage>(
        &mut self,
        destination: NodeId,
        hop: NodeId,
        storage: &mut S,
    ) -> bool {
        let RouteTable::Repeater { next_hop } = self else {
            return false;
        };
        if !routable(destination) || hop == BROADCAST_ADDRESS {
            return false;
        }
        let slot = &mut next_hop[destination as usize - 1];
        if *slot == hop {
            return false;
        }
        *slot = hop;
        storage.save_route(destination, hop);
        true
    }

    /// Reset every entry to "no route" and bulk-persist the table.
    pub fn clear<S: Storage>(&mut self, storage: &mut S) {
        let RouteTable::Repeater { next_hop } = self else {
            return;
        };
        *next_hop = [ROUTE_NONE; ROUTE_TABLE_SIZE];
        storage.save_route_table(next_hop);
    }

    /// Restore the table from the store. Called once at initialize.
    pub fn load<S: Storage>(&mut self, storage: &mut S) {
        let RouteTable::Repeater { next_hop } = self else {
            return;
        };
        for dest in 1..=ROUTE_TABLE_SIZE as u8 {
            next_hop[dest as usize - 1] = storage.load_route(dest);
        }
    }
}

/// Destinations a repeater accepts forwarding for.
fn routable(destination: NodeId) -> bool {
    destination != GATEWAY_ADDRESS && destination != BROADCAST_ADDRESS
}
