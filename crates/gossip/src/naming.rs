//! Display names carried as node properties.

use std::sync::Arc;

use corelib::naming::NameRegistry;
use corelib::node::{InstanceSessionId, NodeIdentifier};

use crate::property::{NodePropertiesListener, NodeProperty, PropertyDistribution};

/// Property key holding a node's display name.
pub const DISPLAY_NAME_PROPERTY_KEY: &str = "displayName";

/// Feeds `displayName` properties into a [`NameRegistry`].
///
/// Names are applied synchronously while the distribution service delivers
/// the change, so register the bridge before any listener that renders node
/// names.
pub struct DisplayNamePropertyBridge {
    registry: Arc<NameRegistry>,
    local_node: InstanceSessionId,
    distribution: Arc<dyn PropertyDistribution>,
}

impl DisplayNamePropertyBridge {
    pub fn start(
        registry: Arc<NameRegistry>,
        local_node: InstanceSessionId,
        distribution: Arc<dyn PropertyDistribution>,
    ) -> Arc<Self> {
        let bridge = Arc::new(Self {
            registry,
            local_node,
            distribution: Arc::clone(&distribution),
        });
        distribution.add_properties_listener(Arc::clone(&bridge) as Arc<dyn NodePropertiesListener>);
        bridge
    }

    /// Names the local node and announces the name to other nodes.
    ///
    /// Returns `false` without announcing anything if the registry refuses
    /// the name because a newer session of this instance has named it.
    pub fn set_local_display_name(&self, name: &str) -> bool {
        if !self.registry.associate_display_name(&self.local_node, name) {
            tracing::warn!(
                node = %self.local_node,
                name,
                "display name refused, a newer session of this instance is named"
            );
            return false;
        }
        self.distribution
            .add_or_update_local_property(DISPLAY_NAME_PROPERTY_KEY, Some(name.to_string()));
        tracing::info!(node = %self.local_node, name, "local display name set");
        true
    }

    pub fn registry(&self) -> &Arc<NameRegistry> {
        &self.registry
    }
}

impl NodePropertiesListener for DisplayNamePropertyBridge {
    fn on_remote_properties_changed(
        &self,
        added: &[NodeProperty],
        updated: &[NodeProperty],
        _removed: &[NodeProperty],
    ) {
        for property in added.iter().chain(updated) {
            if property.key != DISPLAY_NAME_PROPERTY_KEY
                || property.node.is_same_instance_as(&self.local_node)
            {
                continue;
            }
            if let Some(name) = &property.value {
                self.registry.associate_display_name(&property.node, name);
            }
        }
    }
}
