//! Display names for node ids.
//!
//! Names are tracked per instance. Every session id minted through the
//! registry is stamped with a recency value from a monotonically increasing
//! counter; when several sessions of one instance announce a name, the newest
//! session wins and references to older sessions are rendered with
//! [`OUTDATED_SUFFIX`].

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::node::{
    InstanceId, InstanceSessionId, LogicalNodeId, LogicalNodeSessionId, NodeIdentifier,
    DEFAULT_LOGICAL_NODE_PART,
};

/// Name returned for instances nobody has named yet.
pub const DEFAULT_DISPLAY_NAME: &str = "<unknown>";

/// Appended to the name of a session that was superseded by a newer one.
pub const OUTDATED_SUFFIX: &str = " <outdated>";

/// The name currently associated with one instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayNameEntry {
    pub name: String,
    /// Recency of the session that set the name.
    pub recency: u64,
    pub owning_session: InstanceSessionId,
}

#[derive(Default)]
struct RegistryState {
    /// Keyed by instance part.
    entries: HashMap<String, DisplayNameEntry>,
    /// Keyed by instance session key.
    recency: HashMap<String, u64>,
    counter: u64,
}

impl RegistryState {
    fn stamp(&mut self, session_key: String) -> u64 {
        if let Some(existing) = self.recency.get(&session_key) {
            return *existing;
        }
        self.counter += 1;
        let recency = self.counter;
        self.recency.insert(session_key, recency);
        recency
    }
}

/// Last-writer-wins display name table.
///
/// One registry is shared by everything in a process that renders node ids
/// for humans. All operations take a short internal lock.
///
/// # Example
///
/// ```rust
/// use corelib::naming::NameRegistry;
/// use corelib::node::InstanceId;
///
/// let registry = NameRegistry::new();
/// let instance = InstanceId::generate();
/// let session = registry.generate_instance_session_id(&instance);
/// registry.associate_display_name(&session, "Bob");
/// assert_eq!(registry.get_associated_display_name(&instance), "Bob");
/// ```
#[derive(Default)]
pub struct NameRegistry {
    state: Mutex<RegistryState>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a new session of `instance` and stamps it as the newest one.
    pub fn generate_instance_session_id(&self, instance: &InstanceId) -> InstanceSessionId {
        let session = instance.derive_session();
        self.register_session(&session);
        session
    }

    /// Mints a new session of `logical_node` and stamps it as the newest one.
    pub fn generate_logical_node_session_id(&self, logical_node: &LogicalNodeId) -> LogicalNodeSessionId {
        let session = logical_node.derive_session();
        self.register_session(&session);
        session
    }

    /// Stamps a session that was constructed elsewhere, e.g. parsed from a string.
    ///
    /// Returns the recency of the session; a session that is already known
    /// keeps the recency it was stamped with first.
    pub fn register_session(&self, session: &dyn NodeIdentifier) -> Option<u64> {
        let key = session.session_key()?;
        Some(self.state.lock().stamp(key))
    }

    /// Recency stamped on the session of `id`, if any.
    pub fn recency_of(&self, id: &dyn NodeIdentifier) -> Option<u64> {
        let key = id.session_key()?;
        self.state.lock().recency.get(&key).copied()
    }

    /// Associates `name` with the instance owning `session`.
    ///
    /// The call is ignored if a newer session of the same instance already
    /// set a name. Returns whether the entry was written.
    pub fn associate_display_name(&self, session: &InstanceSessionId, name: &str) -> bool {
        let mut state = self.state.lock();
        let recency = state.stamp(session.to_string());
        let instance_part = session.instance_part();

        if let Some(entry) = state.entries.get(instance_part) {
            if recency < entry.recency {
                tracing::debug!(
                    session = %session,
                    name,
                    current = %entry.owning_session,
                    "ignoring display name from an outdated session"
                );
                return false;
            }
            if entry.name == name && entry.recency == recency {
                return true;
            }
        }

        tracing::debug!(session = %session, name, recency, "display name associated");
        state.entries.insert(
            instance_part.to_string(),
            DisplayNameEntry {
                name: name.to_string(),
                recency,
                owning_session: session.clone(),
            },
        );
        true
    }

    /// Resolves the name to show for `id`.
    ///
    /// Falls back to [`DEFAULT_DISPLAY_NAME`]. Sessions older than the one
    /// that set the current name get [`OUTDATED_SUFFIX`]; sessions the
    /// registry has never seen are treated as current.
    pub fn get_associated_display_name(&self, id: &dyn NodeIdentifier) -> String {
        let state = self.state.lock();
        let (mut name, outdated) = match state.entries.get(id.instance_part()) {
            None => (DEFAULT_DISPLAY_NAME.to_string(), false),
            Some(entry) => {
                let outdated = id
                    .session_key()
                    .and_then(|key| state.recency.get(&key).copied())
                    .map(|recency| recency < entry.recency)
                    .unwrap_or(false);
                (entry.name.clone(), outdated)
            }
        };
        drop(state);

        if let Some(logical) = id.logical_part() {
            if logical != DEFAULT_LOGICAL_NODE_PART {
                name.push_str(&format!(" [logical node {}]", logical));
            }
        }
        if outdated {
            name.push_str(OUTDATED_SUFFIX);
        }
        name
    }

    /// The stored name of the owning instance, without defaults or markers.
    pub fn raw_display_name(&self, id: &dyn NodeIdentifier) -> Option<String> {
        self.state
            .lock()
            .entries
            .get(id.instance_part())
            .map(|entry| entry.name.clone())
    }

    /// The current entry of the owning instance.
    pub fn entry(&self, id: &dyn NodeIdentifier) -> Option<DisplayNameEntry> {
        self.state.lock().entries.get(id.instance_part()).cloned()
    }

    /// Renders `id` for log and user messages as `"<name>" [<id>]`.
    pub fn describe(&self, id: &dyn NodeIdentifier) -> String {
        format!("\"{}\" [{}]", self.get_associated_display_name(id), id.canonical())
    }

    /// Clears all names and recency stamps.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_instance_uses_default() {
        let registry = NameRegistry::new();
        let instance = InstanceId::generate();
        assert_eq!(registry.get_associated_display_name(&instance), DEFAULT_DISPLAY_NAME);
        assert_eq!(registry.raw_display_name(&instance), None);
    }

    #[test]
    fn test_newer_session_wins() {
        let registry = NameRegistry::new();
        let instance = InstanceId::generate();
        let older = registry.generate_instance_session_id(&instance);
        let newer = registry.generate_instance_session_id(&instance);

        assert_eq!(registry.get_associated_display_name(&instance), DEFAULT_DISPLAY_NAME);
        assert_eq!(registry.get_associated_display_name(&older), DEFAULT_DISPLAY_NAME);
        assert_eq!(registry.get_associated_display_name(&newer), DEFAULT_DISPLAY_NAME);

        assert!(registry.associate_display_name(&older, "A"));
        assert_eq!(registry.get_associated_display_name(&older), "A");
        assert_eq!(registry.get_associated_display_name(&instance), "A");
        assert_eq!(registry.get_associated_display_name(&newer), "A");

        assert!(registry.associate_display_name(&newer, "B"));
        assert_eq!(registry.get_associated_display_name(&newer), "B");
        assert_eq!(registry.get_associated_display_name(&instance), "B");
        assert_eq!(
            registry.get_associated_display_name(&older),
            format!("B{}", OUTDATED_SUFFIX)
        );

        assert!(!registry.associate_display_name(&older, "C"));
        assert_eq!(registry.get_associated_display_name(&instance), "B");
    }

    #[test]
    fn test_same_session_can_rename() {
        let registry = NameRegistry::new();
        let session = registry.generate_instance_session_id(&InstanceId::generate());
        registry.associate_display_name(&session, "first");
        assert!(registry.associate_display_name(&session, "second"));
        assert_eq!(registry.get_associated_display_name(&session), "second");
    }

    #[test]
    fn test_unseen_session_is_stamped_on_naming() {
        let registry = NameRegistry::new();
        let instance = InstanceId::generate();
        let known = registry.generate_instance_session_id(&instance);
        let foreign = instance.derive_session();

        assert_eq!(registry.recency_of(&foreign), None);
        registry.associate_display_name(&foreign, "late");
        assert!(registry.recency_of(&foreign) > registry.recency_of(&known));
        assert_eq!(
            registry.get_associated_display_name(&known),
            format!("late{}", OUTDATED_SUFFIX)
        );
    }

    #[test]
    fn test_logical_node_suffix() {
        let registry = NameRegistry::new();
        let instance = InstanceId::generate();
        let session = registry.generate_instance_session_id(&instance);
        registry.associate_display_name(&session, "Bob");

        let logical = instance.logical_node_id("2a").unwrap();
        let logical_session = logical.combine_with_session(&session).unwrap();
        assert_eq!(registry.get_associated_display_name(&logical), "Bob [logical node 2a]");
        assert_eq!(
            registry.get_associated_display_name(&logical_session),
            "Bob [logical node 2a]"
        );
        assert_eq!(
            registry.get_associated_display_name(&session.default_logical_node_session_id()),
            "Bob"
        );
    }

    #[test]
    fn test_describe() {
        let registry = NameRegistry::new();
        let session = registry.generate_instance_session_id(&InstanceId::generate());
        registry.associate_display_name(&session, "Bob");
        assert_eq!(registry.describe(&session), format!("\"Bob\" [{}]", session));
    }

    #[test]
    fn test_reset_forgets_names() {
        let registry = NameRegistry::new();
        let session = registry.generate_instance_session_id(&InstanceId::generate());
        registry.associate_display_name(&session, "Bob");
        registry.reset();
        assert_eq!(registry.get_associated_display_name(&session), DEFAULT_DISPLAY_NAME);
        assert_eq!(registry.recency_of(&session), None);
    }
}
