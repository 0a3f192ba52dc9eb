//! Node construction options.
//!
//! Everything here is fixed for the lifetime of a node: identity overrides,
//! the repeater capability (which decides the routing-table variant), and
//! the gateway role. Runtime topology state lives in the node itself and in
//! the persistent store.

use crate::types::NodeId;

/// Build-time configuration for a [`Node`](crate::node::Node).
#[derive(Clone, Copy, Debug, Default)]
pub struct NodeOptions {
    /// Static node id. `None` requests dynamic assignment from the gateway.
    pub node_id: Option<NodeId>,
    /// Static parent. `None` enables the find-parent election.
    pub parent: Option<NodeId>,
    /// Forward frames on behalf of other nodes and keep a routing table.
    pub repeater: bool,
    /// Act as the tree root (address 0, distance 0). Implies `repeater`.
    pub gateway: bool,
    /// Sign outbound unicast frames via the injected signing module.
    pub sign_outbound: bool,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_id(mut self, id: NodeId) -> Self {
        self.node_id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn repeater(mut self) -> Self {
        self.repeater = true;
        self
    }

    /// Gateway role: the tree root. Gateways route downstream traffic, so
    /// this also enables the repeater capability.
    pub fn gateway(mut self) -> Self {
        self.gateway = true;
        self.repeater = true;
        self
    }

    pub fn sign_outbound(mut self) -> Self {
        self.sign_outbound = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_dynamic_leaf() {
        let opts = NodeOptions::new();
        assert_eq!(opts.node_id, None);
        assert_eq!(opts.parent, None);
        assert!(!opts.repeater);
        assert!(!opts.gateway);
    }

    #[test]
    fn gateway_implies_repeater() {
        let opts = NodeOptions::new().gateway();
        assert!(opts.repeater);
    }
}
