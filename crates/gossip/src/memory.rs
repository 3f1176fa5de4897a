//! In-process property distribution.
//!
//! A [`PropertyHub`] connects any number of local endpoints as if every node
//! could reach every other node directly. It is used by tests and the local
//! demo; deliveries happen synchronously on the publishing thread.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use corelib::node::InstanceSessionId;
use parking_lot::{Mutex, ReentrantMutex};

use crate::property::{NodePropertiesListener, NodeProperty, PropertyDistribution};

type Subscription = (InstanceSessionId, Arc<dyn NodePropertiesListener>);

#[derive(Default)]
struct HubState {
    properties: BTreeMap<InstanceSessionId, BTreeMap<String, NodeProperty>>,
    sequences: HashMap<InstanceSessionId, u64>,
    subscriptions: Vec<Subscription>,
}

#[derive(Default)]
struct Changes {
    added: Vec<NodeProperty>,
    updated: Vec<NodeProperty>,
    removed: Vec<NodeProperty>,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Shared property space of all attached endpoints.
pub struct PropertyHub {
    state: Mutex<HubState>,
    /// Keeps deliveries in publication order; reentrant so that a listener
    /// may publish from within a delivery.
    delivery: ReentrantMutex<()>,
    echo: bool,
}

impl PropertyHub {
    pub fn new() -> Arc<Self> {
        Self::build(false)
    }

    /// A hub that also delivers every property back to its publisher.
    pub fn with_echo() -> Arc<Self> {
        Self::build(true)
    }

    fn build(echo: bool) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(HubState::default()),
            delivery: ReentrantMutex::new(()),
            echo,
        })
    }

    /// Creates the distribution endpoint of `node`.
    pub fn attach(self: &Arc<Self>, node: InstanceSessionId) -> Arc<HubEndpoint> {
        tracing::debug!(node = %node, "endpoint attached");
        Arc::new(HubEndpoint {
            hub: Arc::clone(self),
            node,
        })
    }

    /// Removes `node`: its listeners are dropped and its properties are
    /// reported as removed to everybody else.
    pub fn detach(&self, node: &InstanceSessionId) {
        let _delivery = self.delivery.lock();
        let (changes, targets) = {
            let mut state = self.state.lock();
            state.subscriptions.retain(|(owner, _)| owner != node);
            let sequence = state.sequences.get(node).copied().unwrap_or(0) + 1;
            let removed: Vec<NodeProperty> = state
                .properties
                .remove(node)
                .unwrap_or_default()
                .into_values()
                .map(|property| NodeProperty {
                    sequence,
                    value: None,
                    ..property
                })
                .collect();
            state.sequences.insert(node.clone(), sequence);
            let changes = Changes {
                removed,
                ..Changes::default()
            };
            (changes, self.targets(&state, node))
        };
        tracing::debug!(node = %node, removed = changes.removed.len(), "endpoint detached");
        Self::deliver(&changes, &targets);
    }

    /// Current properties of `node` as seen by the hub.
    pub fn properties_of(&self, node: &InstanceSessionId) -> BTreeMap<String, String> {
        self.state
            .lock()
            .properties
            .get(node)
            .map(|properties| {
                properties
                    .iter()
                    .filter_map(|(key, property)| Some((key.clone(), property.value.clone()?)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn publish(&self, node: &InstanceSessionId, properties: BTreeMap<String, Option<String>>) {
        let _delivery = self.delivery.lock();
        let (changes, targets) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let mut sequence = state.sequences.get(node).copied().unwrap_or(0);
            let stored = state.properties.entry(node.clone()).or_default();
            let mut changes = Changes::default();

            for (key, value) in properties {
                match value {
                    Some(value) => {
                        if stored.get(&key).and_then(|p| p.value.as_ref()) == Some(&value) {
                            continue;
                        }
                        sequence += 1;
                        let property = NodeProperty::new(node.clone(), key.clone(), sequence, Some(value));
                        match stored.insert(key, property.clone()) {
                            Some(_) => changes.updated.push(property),
                            None => changes.added.push(property),
                        }
                    }
                    None => {
                        if let Some(previous) = stored.remove(&key) {
                            sequence += 1;
                            changes.removed.push(NodeProperty {
                                sequence,
                                value: None,
                                ..previous
                            });
                        }
                    }
                }
            }
            state.sequences.insert(node.clone(), sequence);
            (changes, self.targets(state, node))
        };
        if changes.is_empty() {
            return;
        }
        Self::deliver(&changes, &targets);
    }

    fn subscribe(&self, node: &InstanceSessionId, listener: Arc<dyn NodePropertiesListener>) {
        let _delivery = self.delivery.lock();
        let known: Vec<NodeProperty> = {
            let mut state = self.state.lock();
            state.subscriptions.push((node.clone(), Arc::clone(&listener)));
            state
                .properties
                .iter()
                .filter(|(owner, _)| self.echo || *owner != node)
                .flat_map(|(_, properties)| properties.values().cloned())
                .collect()
        };
        if !known.is_empty() {
            listener.on_remote_properties_changed(&known, &[], &[]);
        }
    }

    fn targets(&self, state: &HubState, publisher: &InstanceSessionId) -> Vec<Arc<dyn NodePropertiesListener>> {
        state
            .subscriptions
            .iter()
            .filter(|(owner, _)| self.echo || owner != publisher)
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    fn deliver(changes: &Changes, targets: &[Arc<dyn NodePropertiesListener>]) {
        for listener in targets {
            listener.on_remote_properties_changed(&changes.added, &changes.updated, &changes.removed);
        }
    }
}

/// The view of one node onto a [`PropertyHub`].
pub struct HubEndpoint {
    hub: Arc<PropertyHub>,
    node: InstanceSessionId,
}

impl HubEndpoint {
    pub fn node(&self) -> &InstanceSessionId {
        &self.node
    }

    pub fn detach(&self) {
        self.hub.detach(&self.node);
    }
}

impl PropertyDistribution for HubEndpoint {
    fn add_or_update_local_properties(&self, properties: BTreeMap<String, Option<String>>) {
        self.hub.publish(&self.node, properties);
    }

    fn add_properties_listener(&self, listener: Arc<dyn NodePropertiesListener>) {
        self.hub.subscribe(&self.node, listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::node::InstanceId;

    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<(Vec<NodeProperty>, Vec<NodeProperty>, Vec<NodeProperty>)>>,
    }

    impl NodePropertiesListener for Recorder {
        fn on_remote_properties_changed(
            &self,
            added: &[NodeProperty],
            updated: &[NodeProperty],
            removed: &[NodeProperty],
        ) {
            self.batches
                .lock()
                .push((added.to_vec(), updated.to_vec(), removed.to_vec()));
        }
    }

    fn session() -> InstanceSessionId {
        InstanceId::generate().derive_session()
    }

    #[test]
    fn test_publication_reaches_other_endpoints_only() {
        let hub = PropertyHub::new();
        let a = hub.attach(session());
        let b = hub.attach(session());
        let seen_by_a = Arc::new(Recorder::default());
        let seen_by_b = Arc::new(Recorder::default());
        a.add_properties_listener(seen_by_a.clone());
        b.add_properties_listener(seen_by_b.clone());

        a.add_or_update_local_property("k", Some("v1".to_string()));
        a.add_or_update_local_property("k", Some("v2".to_string()));
        a.add_or_update_local_property("k", Some("v2".to_string()));
        a.add_or_update_local_property("k", None);

        assert!(seen_by_a.batches.lock().is_empty());
        let batches = seen_by_b.batches.lock();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].0[0].value.as_deref(), Some("v1"));
        assert_eq!(batches[1].1[0].value.as_deref(), Some("v2"));
        assert_eq!(batches[2].2[0].key, "k");
        assert!(batches[1].1[0].sequence > batches[0].0[0].sequence);
    }

    #[test]
    fn test_late_listener_catches_up() {
        let hub = PropertyHub::new();
        let a = hub.attach(session());
        a.add_or_update_local_property("k", Some("v".to_string()));

        let b = hub.attach(session());
        let seen_by_b = Arc::new(Recorder::default());
        b.add_properties_listener(seen_by_b.clone());
        let batches = seen_by_b.batches.lock();
        assert_eq!(batches.len(), 1);
        assert_eq!(&batches[0].0[0].node, a.node());
    }

    #[test]
    fn test_detach_reports_removals() {
        let hub = PropertyHub::new();
        let a = hub.attach(session());
        let b = hub.attach(session());
        let seen_by_b = Arc::new(Recorder::default());
        b.add_properties_listener(seen_by_b.clone());
        a.add_or_update_local_property("k", Some("v".to_string()));

        a.detach();
        let batches = seen_by_b.batches.lock();
        assert_eq!(batches.last().unwrap().2.len(), 1);
        assert!(hub.properties_of(a.node()).is_empty());
    }

    #[test]
    fn test_echo_delivery() {
        let hub = PropertyHub::with_echo();
        let a = hub.attach(session());
        let seen_by_a = Arc::new(Recorder::default());
        a.add_properties_listener(seen_by_a.clone());
        a.add_or_update_local_property("k", Some("v".to_string()));
        assert_eq!(seen_by_a.batches.lock().len(), 1);
    }
}
