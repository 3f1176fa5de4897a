//! Generic knowledge gossip engine.
//!
//! A [`KnowledgeGossip`] maintains an immutable snapshot that maps every
//! known node to a value built from the properties that node published.
//! What a property means is decided by a [`KnowledgeKind`]: it selects the
//! keys it cares about, decodes their payloads and folds them into the
//! per-node value.
//!
//! # Merge Rules
//!
//! - Local publications are folded into the snapshot before `publish_local`
//!   returns.
//! - Properties sent by the local instance are echoes and always ignored.
//! - A payload that cannot be decoded, or that names another instance than
//!   the one that sent it, is dropped on its own; the rest of the batch is
//!   still merged.
//! - A change whose sequence number is not higher than the last one
//!   accepted for the same node and key is outdated and dropped.
//! - A merge that leaves a node's value unchanged does not produce a new
//!   snapshot or any notification.
//!
//! # Concurrency
//!
//! Snapshot transitions are serialized by one lock per engine; local
//! publications additionally hold a publication lock across the call into
//! the distribution service so they reach it in order. Readers clone
//! the current [`KnowledgeSnapshot`] (a reference count increment) and never
//! observe a partially applied merge. Listener notifications are delivered
//! asynchronously, in order per listener.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use corelib::config::NodeConfig;
use corelib::node::{InstanceSessionId, NodeIdentifier, NodeIdentity};
use parking_lot::{Mutex, RwLock};

use crate::callback::{Callback, OrderedCallbackManager, WorkerPool};
use crate::error::{GossipError, Result};
use crate::property::{NodePropertiesListener, NodeProperty, PropertyDistribution};

/// Interprets one family of node properties.
pub trait KnowledgeKind: Send + Sync + 'static {
    /// Per-node value kept in the snapshot.
    type Value: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    /// Decoded content of one property.
    type Fact: Send;

    /// Name used in logs and metrics.
    fn name(&self) -> &'static str;

    fn owns_key(&self, key: &str) -> bool;

    fn decode(&self, key: &str, payload: &str) -> Result<Self::Fact>;

    fn encode(&self, key: &str, fact: &Self::Fact) -> Result<String>;

    /// Canonical id of the node the payload claims to come from, if it names one.
    fn declared_publisher(&self, _fact: &Self::Fact) -> Option<String> {
        None
    }

    /// Applies one property to the current value of its node.
    ///
    /// `fact` is `None` when the property was withdrawn. Returning `None`
    /// removes the node from the snapshot.
    fn fold(
        &self,
        current: Option<&Self::Value>,
        key: &str,
        fact: Option<Self::Fact>,
    ) -> Option<Self::Value>;
}

/// Immutable view of the merged knowledge.
pub struct KnowledgeSnapshot<V> {
    entries: Arc<HashMap<InstanceSessionId, V>>,
}

impl<V> Clone for KnowledgeSnapshot<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for KnowledgeSnapshot<V> {
    fn default() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for KnowledgeSnapshot<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<V> KnowledgeSnapshot<V> {
    pub fn get(&self, node: &InstanceSessionId) -> Option<&V> {
        self.entries.get(node)
    }

    pub fn contains(&self, node: &InstanceSessionId) -> bool {
        self.entries.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InstanceSessionId, &V)> {
        self.entries.iter()
    }

    /// Node ids in canonical order.
    pub fn nodes(&self) -> Vec<InstanceSessionId> {
        let mut nodes: Vec<_> = self.entries.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// True if both snapshots are the same immutable map.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

/// Changed entries of one transition; `None` marks a removed node.
pub type KnowledgeDelta<V> = BTreeMap<InstanceSessionId, Option<V>>;

/// Receives knowledge changes.
pub trait KnowledgeListener<V>: Send + Sync {
    /// The complete snapshot after a change, and once on registration.
    fn on_knowledge_changed(&self, _snapshot: &KnowledgeSnapshot<V>) {}

    /// The entries that changed, delivered right after `on_knowledge_changed`.
    fn on_knowledge_delta(&self, _delta: &KnowledgeDelta<V>) {}

    /// The local node's own state changed.
    fn on_local_state_updated(&self, _state: &V) {}
}

type Listener<V> = dyn KnowledgeListener<V> + 'static;

/// Collaborators shared by all knowledge engines of one node.
#[derive(Clone)]
pub struct GossipContext {
    pub local_node: InstanceSessionId,
    pub distribution: Arc<dyn PropertyDistribution>,
    pub pool: Arc<WorkerPool>,
    pub verbose_logging: bool,
}

impl GossipContext {
    /// Starts a callback pool sized by `config`.
    pub fn new(
        local_node: InstanceSessionId,
        distribution: Arc<dyn PropertyDistribution>,
        config: &NodeConfig,
    ) -> Result<Self> {
        let pool = WorkerPool::new("knowledge-callbacks", config.callback_workers)?;
        Ok(Self {
            local_node,
            distribution,
            pool,
            verbose_logging: config.verbose_logging,
        })
    }
}

struct LocalState<V> {
    /// Last payload sent per key.
    published: HashMap<String, String>,
    announced: Option<V>,
}

/// Last accepted sequence number per publishing node and key.
type SequenceTable = HashMap<(InstanceSessionId, String), u64>;

/// Merges local and remote properties of one [`KnowledgeKind`].
pub struct KnowledgeGossip<K: KnowledgeKind> {
    kind: K,
    local_node: InstanceSessionId,
    distribution: Arc<dyn PropertyDistribution>,
    snapshot: RwLock<KnowledgeSnapshot<K::Value>>,
    publication: Mutex<LocalState<K::Value>>,
    transition: Mutex<SequenceTable>,
    callbacks: OrderedCallbackManager<Listener<K::Value>>,
    verbose_logging: bool,
}

impl<K: KnowledgeKind> KnowledgeGossip<K> {
    pub fn new(kind: K, context: &GossipContext) -> Self {
        Self {
            callbacks: OrderedCallbackManager::new(kind.name(), Arc::clone(&context.pool)),
            kind,
            local_node: context.local_node.clone(),
            distribution: Arc::clone(&context.distribution),
            snapshot: RwLock::new(KnowledgeSnapshot::default()),
            publication: Mutex::new(LocalState {
                published: HashMap::new(),
                announced: None,
            }),
            transition: Mutex::new(SequenceTable::new()),
            verbose_logging: context.verbose_logging,
        }
    }

    /// Creates the engine and registers it with the distribution service.
    pub fn start(kind: K, context: &GossipContext) -> Arc<Self> {
        let gossip = Arc::new(Self::new(kind, context));
        context
            .distribution
            .add_properties_listener(Arc::clone(&gossip) as Arc<dyn NodePropertiesListener>);
        gossip
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub fn local_node(&self) -> &InstanceSessionId {
        &self.local_node
    }

    pub fn current_knowledge(&self) -> KnowledgeSnapshot<K::Value> {
        self.snapshot.read().clone()
    }

    /// The local node's entry in the current snapshot.
    pub fn local_value(&self) -> Option<K::Value> {
        self.snapshot.read().get(&self.local_node).cloned()
    }

    /// Publishes `fact` under `key` and folds it into the local entry.
    ///
    /// Publishing the same payload again is a no-op.
    pub fn publish_local(&self, key: &str, fact: K::Fact) -> Result<()> {
        if !self.kind.owns_key(key) {
            return Err(GossipError::UnknownKey(key.to_string()));
        }
        let payload = self.kind.encode(key, &fact)?;

        let mut local = self.publication.lock();
        if local.published.get(key) == Some(&payload) {
            return Ok(());
        }
        self.distribution
            .add_or_update_local_property(key, Some(payload.clone()));
        local.published.insert(key.to_string(), payload);

        let _transition = self.transition.lock();
        let current = self.snapshot.read().clone();
        let next = self.kind.fold(current.get(&self.local_node), key, Some(fact));
        let mut delta = KnowledgeDelta::new();
        self.stage(&current, &self.local_node, next, &mut delta);
        self.commit(&current, delta);
        Ok(())
    }

    /// Withdraws the local property `key`.
    pub fn retract_local(&self, key: &str) -> Result<()> {
        if !self.kind.owns_key(key) {
            return Err(GossipError::UnknownKey(key.to_string()));
        }
        let mut local = self.publication.lock();
        if local.published.remove(key).is_none() {
            return Ok(());
        }
        self.distribution.add_or_update_local_property(key, None);

        let _transition = self.transition.lock();
        let current = self.snapshot.read().clone();
        let next = self.kind.fold(current.get(&self.local_node), key, None);
        let mut delta = KnowledgeDelta::new();
        self.stage(&current, &self.local_node, next, &mut delta);
        self.commit(&current, delta);
        Ok(())
    }

    /// Notifies listeners about a new local state.
    ///
    /// Independent of what is published; the topology uses this to report
    /// real links even while it publishes an empty link state.
    pub fn announce_local_state(&self, state: K::Value) {
        let mut local = self.publication.lock();
        if local.announced.as_ref() == Some(&state) {
            return;
        }
        tracing::debug!(kind = self.kind.name(), state = ?state, "local state updated");
        local.announced = Some(state.clone());
        self.callbacks.enqueue(Arc::new(move |listener: &Listener<K::Value>| {
            listener.on_local_state_updated(&state)
        }));
    }

    /// Registers `listener`; it first receives the current snapshot and the
    /// last announced local state.
    pub fn add_listener(&self, listener: Arc<dyn KnowledgeListener<K::Value>>) {
        let local = self.publication.lock();
        let _transition = self.transition.lock();
        let snapshot = self.snapshot.read().clone();
        let announced = local.announced.clone();
        let initial: Callback<Listener<K::Value>> =
            Arc::new(move |listener: &Listener<K::Value>| {
                listener.on_knowledge_changed(&snapshot);
                if let Some(state) = &announced {
                    listener.on_local_state_updated(state);
                }
            });
        self.callbacks.add_listener_and_enqueue(listener, initial);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn KnowledgeListener<K::Value>>) -> bool {
        self.callbacks.remove_listener(listener)
    }

    /// Merges a batch of remote property changes.
    pub fn merge_remote(
        &self,
        added: &[NodeProperty],
        updated: &[NodeProperty],
        removed: &[NodeProperty],
    ) {
        let relevant = |property: &&NodeProperty| {
            self.kind.owns_key(&property.key) && !self.is_echo(property)
        };
        let changed: Vec<&NodeProperty> = added.iter().chain(updated).filter(relevant).collect();
        let withdrawn: Vec<&NodeProperty> = removed.iter().filter(relevant).collect();
        if changed.is_empty() && withdrawn.is_empty() {
            return;
        }

        let mut sequences = self.transition.lock();
        let current = self.snapshot.read().clone();
        let mut working: HashMap<InstanceSessionId, Option<K::Value>> = HashMap::new();

        for property in changed {
            if self.is_outdated(&sequences, property) {
                continue;
            }
            let fact = match self.accept(property) {
                Ok(fact) => fact,
                Err(err) => {
                    self.reject(property, &err);
                    continue;
                }
            };
            sequences.insert((property.node.clone(), property.key.clone()), property.sequence);
            let previous = Self::working_value(&current, &working, &property.node);
            let next = self.kind.fold(previous.as_ref(), &property.key, fact);
            working.insert(property.node.clone(), next);
        }
        for property in withdrawn {
            if self.is_outdated(&sequences, property) {
                continue;
            }
            sequences.insert((property.node.clone(), property.key.clone()), property.sequence);
            let previous = Self::working_value(&current, &working, &property.node);
            let next = self.kind.fold(previous.as_ref(), &property.key, None);
            working.insert(property.node.clone(), next);
        }

        let mut delta = KnowledgeDelta::new();
        for (node, next) in working {
            self.stage(&current, &node, next, &mut delta);
        }
        if !delta.is_empty() {
            metrics::counter!("gossip_entries_merged_total", "kind" => self.kind.name())
                .increment(delta.len() as u64);
        }
        self.commit(&current, delta);
    }

    fn is_outdated(&self, sequences: &SequenceTable, property: &NodeProperty) -> bool {
        let last = match sequences.get(&(property.node.clone(), property.key.clone())) {
            Some(last) => *last,
            None => return false,
        };
        if property.sequence > last {
            return false;
        }
        tracing::debug!(
            kind = self.kind.name(),
            node = %property.node,
            key = %property.key,
            sequence = property.sequence,
            last,
            "ignoring outdated property change"
        );
        true
    }

    fn is_echo(&self, property: &NodeProperty) -> bool {
        property.node.is_same_instance_as(&self.local_node)
    }

    fn accept(&self, property: &NodeProperty) -> Result<Option<K::Fact>> {
        let payload = match &property.value {
            Some(payload) => payload,
            None => return Ok(None),
        };
        let fact = self.kind.decode(&property.key, payload)?;
        if let Some(declared) = self.kind.declared_publisher(&fact) {
            let declared_id = NodeIdentity::parse(&declared)
                .map_err(|e| GossipError::malformed(&property.key, e))?;
            if !declared_id.is_same_instance_as(&property.node) {
                return Err(GossipError::PublisherMismatch {
                    declared,
                    sender: property.node.to_string(),
                });
            }
        }
        Ok(Some(fact))
    }

    fn reject(&self, property: &NodeProperty, err: &GossipError) {
        match err {
            GossipError::PublisherMismatch { .. } => tracing::error!(
                kind = self.kind.name(),
                node = %property.node,
                key = %property.key,
                security = true,
                error = %err,
                "dropping inconsistent knowledge entry"
            ),
            _ => tracing::warn!(
                kind = self.kind.name(),
                node = %property.node,
                key = %property.key,
                error = %err,
                "dropping malformed knowledge entry"
            ),
        }
        metrics::counter!(
            "gossip_entries_dropped_total",
            "kind" => self.kind.name(),
            "reason" => err.reason_label()
        )
        .increment(1);
    }

    fn working_value(
        current: &KnowledgeSnapshot<K::Value>,
        working: &HashMap<InstanceSessionId, Option<K::Value>>,
        node: &InstanceSessionId,
    ) -> Option<K::Value> {
        match working.get(node) {
            Some(value) => value.clone(),
            None => current.get(node).cloned(),
        }
    }

    fn stage(
        &self,
        current: &KnowledgeSnapshot<K::Value>,
        node: &InstanceSessionId,
        next: Option<K::Value>,
        delta: &mut KnowledgeDelta<K::Value>,
    ) {
        if current.get(node) != next.as_ref() {
            delta.insert(node.clone(), next);
        }
    }

    /// Swaps in a new snapshot with `delta` applied and notifies listeners.
    /// Must be called with the transition lock held.
    fn commit(&self, current: &KnowledgeSnapshot<K::Value>, delta: KnowledgeDelta<K::Value>) {
        if delta.is_empty() {
            return;
        }
        let mut entries = (*current.entries).clone();
        for (node, value) in &delta {
            match value {
                Some(value) => {
                    entries.insert(node.clone(), value.clone());
                }
                None => {
                    entries.remove(node);
                }
            }
        }
        let snapshot = KnowledgeSnapshot {
            entries: Arc::new(entries),
        };
        *self.snapshot.write() = snapshot.clone();

        if self.verbose_logging {
            tracing::debug!(kind = self.kind.name(), snapshot = ?snapshot, "knowledge updated");
        } else {
            tracing::debug!(
                kind = self.kind.name(),
                nodes = snapshot.len(),
                changed = delta.len(),
                "knowledge updated"
            );
        }

        self.callbacks.enqueue(Arc::new(move |listener: &Listener<K::Value>| {
            listener.on_knowledge_changed(&snapshot)
        }));
        self.callbacks.enqueue(Arc::new(move |listener: &Listener<K::Value>| {
            listener.on_knowledge_delta(&delta)
        }));
    }
}

impl<K: KnowledgeKind> NodePropertiesListener for KnowledgeGossip<K> {
    fn on_remote_properties_changed(
        &self,
        added: &[NodeProperty],
        updated: &[NodeProperty],
        removed: &[NodeProperty],
    ) {
        self.merge_remote(added, updated, removed);
    }
}
