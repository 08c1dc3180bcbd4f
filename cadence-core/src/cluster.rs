//! Cluster membership and the trigger locality rules built on it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use cadence_model::Trigger;

/// Data-map key recording the node that created or last acquired a trigger.
pub const OWNER_NODE_KEY: &str = "node.identity";

/// Data-map key restricting a trigger to one node.
pub const LIMIT_NODE_KEY: &str = ".limitNodeId";

/// Membership view consumed by the coordinator.
pub trait NodeAccess: Send + Sync + fmt::Debug {
    fn is_clustered(&self) -> bool;

    fn local_node_id(&self) -> &str;

    fn member_ids(&self) -> BTreeSet<String>;
}

/// A single, non-clustered node.
#[derive(Debug, Clone)]
pub struct LocalNode {
    id: String,
}

impl LocalNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl NodeAccess for LocalNode {
    fn is_clustered(&self) -> bool {
        false
    }

    fn local_node_id(&self) -> &str {
        &self.id
    }

    fn member_ids(&self) -> BTreeSet<String> {
        BTreeSet::from([self.id.clone()])
    }
}

/// Clustered membership backed by a shared, mutable member set.
///
/// Every handle created through [`StaticMembership::node`] sees the same
/// member set, so joins and departures are visible cluster-wide.
#[derive(Debug, Clone)]
pub struct StaticMembership {
    local_id: String,
    members: Arc<RwLock<BTreeSet<String>>>,
}

impl StaticMembership {
    /// Starts a cluster whose first member is `local_id`.
    pub fn new(local_id: impl Into<String>) -> Self {
        let local_id = local_id.into();
        let members = BTreeSet::from([local_id.clone()]);
        Self {
            local_id,
            members: Arc::new(RwLock::new(members)),
        }
    }

    /// Joins another node to the same cluster and returns its view.
    pub fn node(&self, id: impl Into<String>) -> Self {
        let id = id.into();
        self.join(id.clone());
        Self {
            local_id: id,
            members: Arc::clone(&self.members),
        }
    }

    pub fn join(&self, id: impl Into<String>) {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into());
    }

    pub fn leave(&self, id: &str) -> bool {
        self.members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

impl NodeAccess for StaticMembership {
    fn is_clustered(&self) -> bool {
        true
    }

    fn local_node_id(&self) -> &str {
        &self.local_id
    }

    fn member_ids(&self) -> BTreeSet<String> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Why a node-limited trigger cannot run anywhere right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingLimitNode {
    NotConfiguredForHa,
    NotAMember(String),
}

/// Membership snapshot taken once per operation.
#[derive(Debug, Clone)]
pub struct Locality {
    clustered: bool,
    local_id: String,
    members: BTreeSet<String>,
}

impl Locality {
    pub fn capture(node: &dyn NodeAccess) -> Self {
        Self {
            clustered: node.is_clustered(),
            local_id: node.local_node_id().to_string(),
            members: node.member_ids(),
        }
    }

    pub fn is_clustered(&self) -> bool {
        self.clustered
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Whether this node is responsible for `trigger`.
    ///
    /// A limit id wins over the owner id. Either one names this node, or
    /// names a node that has left the cluster, in which case the trigger is
    /// adopted.
    pub fn is_local(&self, trigger: &Trigger) -> bool {
        if !self.clustered {
            return true;
        }
        let node = trigger
            .data
            .get(LIMIT_NODE_KEY)
            .or_else(|| trigger.data.get(OWNER_NODE_KEY));
        match node {
            Some(id) => id == self.local_id || !self.members.contains(id),
            None => true,
        }
    }

    /// Set when the trigger is limited to a node outside the cluster.
    pub fn missing_limit_node(&self, trigger: &Trigger) -> Option<MissingLimitNode> {
        if !self.clustered {
            return None;
        }
        let limit = trigger.data.get(LIMIT_NODE_KEY)?;
        if limit == self.local_id || self.members.contains(limit) {
            return None;
        }
        if limit.trim().is_empty() {
            Some(MissingLimitNode::NotConfiguredForHa)
        } else {
            Some(MissingLimitNode::NotAMember(limit.to_string()))
        }
    }

    /// Whether the trigger is limited to exactly this node.
    pub fn is_limited_to_local(&self, trigger: &Trigger) -> bool {
        trigger.data.get(LIMIT_NODE_KEY) == Some(self.local_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_model::{JobKey, Schedule, TriggerKey};
    use chrono::Utc;

    fn trigger() -> Trigger {
        Trigger::new(
            TriggerKey::in_default_group("t"),
            JobKey::in_default_group("j"),
            Schedule::Once,
            Utc::now(),
        )
    }

    #[test]
    fn everything_is_local_without_clustering() {
        let locality = Locality::capture(&LocalNode::new("solo"));
        let owned_elsewhere = trigger().with_data(OWNER_NODE_KEY, "other");
        assert!(locality.is_local(&owned_elsewhere));
        assert_eq!(locality.missing_limit_node(&owned_elsewhere), None);
    }

    #[test]
    fn owner_and_limit_rules() {
        let a = StaticMembership::new("a");
        let _b = a.node("b");
        let locality = Locality::capture(&a);

        assert!(locality.is_local(&trigger().with_data(OWNER_NODE_KEY, "a")));
        assert!(!locality.is_local(&trigger().with_data(OWNER_NODE_KEY, "b")));
        assert!(locality.is_local(&trigger().with_data(OWNER_NODE_KEY, "gone")));
        assert!(locality.is_local(&trigger()));

        let limited_to_b = trigger()
            .with_data(OWNER_NODE_KEY, "a")
            .with_data(LIMIT_NODE_KEY, "b");
        assert!(!locality.is_local(&limited_to_b));
    }

    #[test]
    fn departed_nodes_are_adopted() {
        let a = StaticMembership::new("a");
        let b = a.node("b");
        let owned_by_b = trigger().with_data(OWNER_NODE_KEY, "b");
        assert!(!Locality::capture(&a).is_local(&owned_by_b));

        a.leave(b.local_node_id());
        assert!(Locality::capture(&a).is_local(&owned_by_b));
    }

    #[test]
    fn missing_limit_nodes_are_reported() {
        let locality = Locality::capture(&StaticMembership::new("a"));
        let blank = trigger().with_data(LIMIT_NODE_KEY, "  ");
        let gone = trigger().with_data(LIMIT_NODE_KEY, "z");
        let here = trigger().with_data(LIMIT_NODE_KEY, "a");

        assert_eq!(
            locality.missing_limit_node(&blank),
            Some(MissingLimitNode::NotConfiguredForHa)
        );
        assert_eq!(
            locality.missing_limit_node(&gone),
            Some(MissingLimitNode::NotAMember("z".into()))
        );
        assert_eq!(locality.missing_limit_node(&here), None);
        assert!(locality.is_limited_to_local(&here));
    }
}
