use std::collections::HashMap;

use crosslock_core::order::{OrderAnnouncement, OrderDetails, Proposal};
use crosslock_core::types::{OrderId, ProposalId};

/// All negotiation state for one node. Owned exclusively by the engine
/// task; readers get clones through query commands.
#[derive(Default)]
pub struct NegotiationState {
    /// Every announcement seen on the gossip topic, own orders included.
    pub orders: HashMap<OrderId, OrderAnnouncement>,
    /// Full terms for orders this node created (never shared unsealed).
    pub own_details: HashMap<OrderId, OrderDetails>,
    /// Terms revealed to this node by makers.
    pub peer_details: HashMap<OrderId, OrderDetails>,
    /// Proposals by id, both sent and received.
    pub proposals: HashMap<ProposalId, Proposal>,
}

impl NegotiationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_orders(&self) -> Vec<OrderAnnouncement> {
        let mut orders: Vec<_> = self.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        orders
    }

    /// Proposals for one order, found by the order-id prefix embedded in
    /// every proposal id.
    pub fn list_proposals(&self, order_id: &OrderId) -> Vec<Proposal> {
        let mut proposals: Vec<_> = self
            .proposals
            .values()
            .filter(|p| &p.order_id == order_id)
            .cloned()
            .collect();
        proposals.sort_by(|a, b| a.proposal_id.cmp(&b.proposal_id));
        proposals
    }

    /// Details for an order regardless of which side produced them.
    pub fn details(&self, order_id: &OrderId) -> Option<&OrderDetails> {
        self.own_details
            .get(order_id)
            .or_else(|| self.peer_details.get(order_id))
    }

    pub fn is_maker_of(&self, order_id: &OrderId) -> bool {
        self.own_details.contains_key(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosslock_core::order::{AssetTag, OrderType};
    use crosslock_core::types::PeerTag;

    fn announcement(id: &str) -> OrderAnnouncement {
        OrderAnnouncement::new(
            OrderId(id.into()),
            OrderType::Sell,
            AssetTag::from("SOL"),
            PeerTag("maker".into()),
            100,
            200,
        )
        .unwrap()
    }

    fn proposal(order: &str, suffix: &str, price: u64) -> Proposal {
        Proposal::new(
            ProposalId(format!("{order}/p-{suffix}")),
            OrderId(order.into()),
            PeerTag("taker".into()),
            price,
            10,
            100,
        )
        .unwrap()
    }

    #[test]
    fn announcements_overwrite_by_id() {
        let mut state = NegotiationState::new();
        state.orders.insert(OrderId("ord-1".into()), announcement("ord-1"));
        let mut newer = announcement("ord-1");
        newer.expires_at = 999;
        state.orders.insert(OrderId("ord-1".into()), newer.clone());
        assert_eq!(state.orders.len(), 1);
        assert_eq!(state.orders[&OrderId("ord-1".into())], newer);
    }

    #[test]
    fn proposals_filtered_per_order() {
        let mut state = NegotiationState::new();
        for (order, suffix) in [("ord-1", "aa"), ("ord-1", "bb"), ("ord-2", "cc")] {
            let p = proposal(order, suffix, 5);
            state.proposals.insert(p.proposal_id.clone(), p);
        }
        assert_eq!(state.list_proposals(&OrderId("ord-1".into())).len(), 2);
        assert_eq!(state.list_proposals(&OrderId("ord-2".into())).len(), 1);
    }

    #[test]
    fn maker_side_is_derived_from_own_details() {
        let mut state = NegotiationState::new();
        let details = OrderDetails {
            order_id: OrderId("ord-1".into()),
            order_type: OrderType::Sell,
            amount: 10,
            min_price: 1,
            max_price: 2,
            asset: AssetTag::from("SOL"),
        };
        state.own_details.insert(details.order_id.clone(), details);
        assert!(state.is_maker_of(&OrderId("ord-1".into())));
        assert!(!state.is_maker_of(&OrderId("ord-2".into())));
    }
}
