//! Node properties and the distribution collaborator.
//!
//! Every node owns a set of string properties. A property-distribution
//! service spreads them to all reachable nodes and reports remote changes to
//! registered [`NodePropertiesListener`]s. A property whose value is `None`
//! has been withdrawn by its owner.

use std::collections::BTreeMap;
use std::sync::Arc;

use corelib::node::InstanceSessionId;

/// One property of one node as seen by the receiving side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeProperty {
    /// The node that owns (and sent) the property.
    pub node: InstanceSessionId,
    pub key: String,
    /// Per-publisher sequence number; higher means newer.
    pub sequence: u64,
    pub value: Option<String>,
}

impl NodeProperty {
    pub fn new(
        node: InstanceSessionId,
        key: impl Into<String>,
        sequence: u64,
        value: Option<String>,
    ) -> Self {
        Self {
            node,
            key: key.into(),
            sequence,
            value,
        }
    }
}

/// Receives changes of properties published by other nodes.
pub trait NodePropertiesListener: Send + Sync {
    /// Called with the properties that appeared, changed and disappeared.
    ///
    /// Implementations must not block on work that needs the distribution
    /// service; heavy processing belongs on another thread.
    fn on_remote_properties_changed(
        &self,
        added: &[NodeProperty],
        updated: &[NodeProperty],
        removed: &[NodeProperty],
    );
}

/// The property-distribution service of the local node.
pub trait PropertyDistribution: Send + Sync {
    /// Publishes several local properties at once; `None` withdraws a key.
    fn add_or_update_local_properties(&self, properties: BTreeMap<String, Option<String>>);

    fn add_or_update_local_property(&self, key: &str, value: Option<String>) {
        let mut properties = BTreeMap::new();
        properties.insert(key.to_string(), value);
        self.add_or_update_local_properties(properties);
    }

    /// Registers a listener for remote property changes.
    ///
    /// Properties already known are reported to the new listener as added.
    fn add_properties_listener(&self, listener: Arc<dyn NodePropertiesListener>);
}
