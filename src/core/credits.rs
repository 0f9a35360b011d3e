//! Credit ledger: per-node cost model and the running balance.
//!
//! The cost function is pure and type-driven: flat for most node types, two
//! tiers for Upscale (by scale factor) and Video (by duration). The balance
//! is set at startup, may be replenished by an external authority, and is
//! decremented only on real successes — never for cache hits, blocked or
//! failed nodes.

use log::{debug, warn};

use crate::config::{
    COST_COMPARE, COST_MODIFY, COST_RENDER, COST_SOURCE, COST_UPSCALE_HEAVY,
    COST_UPSCALE_STANDARD, COST_VIDEO_LONG, COST_VIDEO_SHORT, UPSCALE_HEAVY_FACTOR,
    VIDEO_LONG_SECS,
};
use crate::entities::{Graph, Node, NodeParams};

#[derive(Debug, Clone)]
pub struct CreditLedger {
    balance: u32,
}

impl CreditLedger {
    pub fn new(balance: u32) -> Self {
        Self { balance }
    }

    pub fn balance(&self) -> u32 {
        self.balance
    }

    /// External authority: replace the balance outright.
    pub fn set_balance(&mut self, balance: u32) {
        debug!("Credit balance set: {} -> {}", self.balance, balance);
        self.balance = balance;
    }

    /// External authority: add credits.
    pub fn deposit(&mut self, amount: u32) {
        self.balance = self.balance.saturating_add(amount);
        debug!("Credits deposited: +{} -> {}", amount, self.balance);
    }

    /// Cost of executing one node, by type and tier.
    pub fn cost(node: &Node) -> u32 {
        match &node.params {
            NodeParams::Source(_) => COST_SOURCE,
            NodeParams::Render(_) => COST_RENDER,
            NodeParams::Modify(_) => COST_MODIFY,
            NodeParams::Upscale(p) => {
                if p.factor > UPSCALE_HEAVY_FACTOR {
                    COST_UPSCALE_HEAVY
                } else {
                    COST_UPSCALE_STANDARD
                }
            }
            NodeParams::Video(p) => {
                if p.duration_secs > VIDEO_LONG_SECS {
                    COST_VIDEO_LONG
                } else {
                    COST_VIDEO_SHORT
                }
            }
            NodeParams::Compare(_) => COST_COMPARE,
        }
    }

    /// Worst-case cost of the next run: every dirty node, whether or not
    /// the cache will end up skipping some of them.
    pub fn estimate(graph: &Graph) -> u32 {
        graph.nodes().filter(|n| n.dirty).map(Self::cost).sum()
    }

    /// Deduct a node's cost after its real (non-cached) success.
    /// Returns the amount charged.
    pub fn charge(&mut self, node: &Node) -> u32 {
        let cost = Self::cost(node);
        if cost > self.balance {
            // The pre-flight estimate should make this unreachable.
            warn!("Charge of {} for {} exceeds balance {}", cost, node.id, self.balance);
        }
        self.balance = self.balance.saturating_sub(cost);
        debug!("Charged {} credits for {} (balance {})", cost, node.id, self.balance);
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::entities::{NodeId, NodeType, UpscaleParams, VideoParams};

    fn node_of(kind: NodeType) -> Node {
        Node::new(NodeId(0), kind, (0.0, 0.0))
    }

    #[test]
    fn test_flat_costs() {
        assert_eq!(CreditLedger::cost(&node_of(NodeType::Source)), config::COST_SOURCE);
        assert_eq!(CreditLedger::cost(&node_of(NodeType::Renderer)), config::COST_RENDER);
        assert_eq!(CreditLedger::cost(&node_of(NodeType::Modifier)), config::COST_MODIFY);
        assert_eq!(CreditLedger::cost(&node_of(NodeType::Compare)), 0);
    }

    #[test]
    fn test_upscale_tiers() {
        let mut n = node_of(NodeType::Upscale);
        n.params = NodeParams::Upscale(UpscaleParams { factor: 2.0, denoise: false });
        assert_eq!(CreditLedger::cost(&n), config::COST_UPSCALE_STANDARD);
        n.params = NodeParams::Upscale(UpscaleParams { factor: 4.0, denoise: false });
        assert_eq!(CreditLedger::cost(&n), config::COST_UPSCALE_HEAVY);
    }

    #[test]
    fn test_video_tiers() {
        let mut n = node_of(NodeType::Video);
        n.params = NodeParams::Video(VideoParams { duration_secs: 4.0, ..Default::default() });
        assert_eq!(CreditLedger::cost(&n), config::COST_VIDEO_SHORT);
        n.params = NodeParams::Video(VideoParams { duration_secs: 8.0, ..Default::default() });
        assert_eq!(CreditLedger::cost(&n), config::COST_VIDEO_LONG);
    }

    #[test]
    fn test_estimate_sums_dirty_only() {
        let mut g = Graph::new();
        let s = g.add_node(NodeType::Source, (0.0, 0.0));
        let r = g.add_node(NodeType::Renderer, (0.0, 0.0));
        assert_eq!(CreditLedger::estimate(&g), config::COST_SOURCE + config::COST_RENDER);

        g.node_mut(s).unwrap().dirty = false;
        assert_eq!(CreditLedger::estimate(&g), config::COST_RENDER);

        g.node_mut(r).unwrap().dirty = false;
        assert_eq!(CreditLedger::estimate(&g), 0);
    }

    #[test]
    fn test_charge_and_replenish() {
        let mut ledger = CreditLedger::new(10);
        let n = node_of(NodeType::Renderer);
        let charged = ledger.charge(&n);
        assert_eq!(charged, config::COST_RENDER);
        assert_eq!(ledger.balance(), 10 - config::COST_RENDER);

        ledger.deposit(5);
        assert_eq!(ledger.balance(), 15 - config::COST_RENDER);
        ledger.set_balance(3);
        assert_eq!(ledger.balance(), 3);
    }
}
