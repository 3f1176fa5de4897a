//! Node identity model.
//!
//! Every participant is addressed by one of four id kinds, all derived from a
//! fixed-length instance part:
//!
//! ```text
//! instance id                <instance>
//! instance session id        <instance>::<session>
//! logical node id            <instance>:<logical>
//! logical node session id    <instance>:<logical>:<session>
//! ```
//!
//! Ids are immutable and cheap to clone (the canonical string is shared).
//! Equality and hashing are defined on the canonical string only, so an id
//! parsed from a string is interchangeable with the id it was printed from.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Number of lowercase hex characters in an instance part.
pub const INSTANCE_PART_LENGTH: usize = 32;

/// Number of lowercase hex characters in a session part.
pub const SESSION_PART_LENGTH: usize = 10;

/// Upper bound for the length of a logical node part.
pub const MAXIMUM_LOGICAL_NODE_PART_LENGTH: usize = 33;

/// Logical part denoting the primary logical node of an instance.
pub const DEFAULT_LOGICAL_NODE_PART: &str = "0";

const SEPARATOR: char = ':';
const SESSION_SEPARATOR: &str = "::";

/// The four id kinds.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum IdKind {
    Instance,
    InstanceSession,
    LogicalNode,
    LogicalNodeSession,
}

impl IdKind {
    /// Human-readable name used in error messages.
    pub fn description(&self) -> &'static str {
        match self {
            IdKind::Instance => "instance id",
            IdKind::InstanceSession => "instance session id",
            IdKind::LogicalNode => "logical node id",
            IdKind::LogicalNodeSession => "logical node session id",
        }
    }

    /// True for the two kinds carrying a session part.
    pub fn has_session(&self) -> bool {
        matches!(self, IdKind::InstanceSession | IdKind::LogicalNodeSession)
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Accessors shared by all id kinds.
pub trait NodeIdentifier {
    /// The canonical string form; parsing it yields an equal id.
    fn canonical(&self) -> &str;

    fn kind(&self) -> IdKind;

    fn instance_part(&self) -> &str {
        &self.canonical()[..INSTANCE_PART_LENGTH]
    }

    fn session_part(&self) -> Option<&str>;

    fn logical_part(&self) -> Option<&str>;

    /// Canonical form of the instance session this id belongs to, if any.
    ///
    /// Logical node sessions share the session part of their instance
    /// session, so both map to the same key.
    fn session_key(&self) -> Option<String> {
        self.session_part()
            .map(|session| format!("{}{}{}", self.instance_part(), SESSION_SEPARATOR, session))
    }

    fn is_same_instance_as(&self, other: &dyn NodeIdentifier) -> bool {
        self.instance_part() == other.instance_part()
    }
}

macro_rules! impl_id_common {
    ($ty:ident, $kind:expr) => {
        impl $ty {
            /// Parses the canonical string form.
            pub fn parse(input: &str) -> Result<Self> {
                input.parse()
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl From<$ty> for NodeIdentity {
            fn from(id: $ty) -> Self {
                $kind(id)
            }
        }
    };
}

/// Identifies one running process instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InstanceId(Arc<str>);

/// An instance id plus the session part minted at process start.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct InstanceSessionId(Arc<str>);

/// A virtual sub-node hosted by an instance.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LogicalNodeId(Arc<str>);

/// A logical node id plus a session part; the unit addressed by RPC calls.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct LogicalNodeSessionId(Arc<str>);

impl_id_common!(InstanceId, NodeIdentity::Instance);
impl_id_common!(InstanceSessionId, NodeIdentity::InstanceSession);
impl_id_common!(LogicalNodeId, NodeIdentity::LogicalNode);
impl_id_common!(LogicalNodeSessionId, NodeIdentity::LogicalNodeSession);

impl InstanceId {
    /// Creates a new random instance id.
    pub fn generate() -> Self {
        let raw: u128 = rand::thread_rng().gen();
        InstanceId(format!("{:032x}", raw).into())
    }

    /// Creates a new, not yet registered session of this instance.
    ///
    /// Session recency is tracked by [`crate::naming::NameRegistry`]; use
    /// its `generate_*` methods for sessions that take part in naming.
    pub fn derive_session(&self) -> InstanceSessionId {
        InstanceSessionId(join_session(&self.0, &random_session_part()))
    }

    /// Combines this instance id with an explicit session part.
    pub fn with_session_part(&self, session_part: &str) -> Result<InstanceSessionId> {
        let kind = IdKind::InstanceSession;
        check_session_part(session_part, session_part, kind)?;
        Ok(InstanceSessionId(join_session(&self.0, session_part)))
    }

    pub fn logical_node_id(&self, logical_part: &str) -> Result<LogicalNodeId> {
        check_logical_part(logical_part, logical_part, IdKind::LogicalNode)?;
        Ok(LogicalNodeId(join_logical(&self.0, logical_part)))
    }

    pub fn default_logical_node_id(&self) -> LogicalNodeId {
        LogicalNodeId(join_logical(&self.0, DEFAULT_LOGICAL_NODE_PART))
    }
}

impl InstanceSessionId {
    pub fn instance_id(&self) -> InstanceId {
        InstanceId(self.instance_part().into())
    }

    pub fn session_part(&self) -> &str {
        &self.0[self.0.len() - SESSION_PART_LENGTH..]
    }

    pub fn default_logical_node_session_id(&self) -> LogicalNodeSessionId {
        let logical = join_logical(self.instance_part(), DEFAULT_LOGICAL_NODE_PART);
        LogicalNodeSessionId(join_logical(&logical, self.session_part()))
    }

    /// True if both ids denote the same lifetime of the same instance.
    pub fn is_same_session_as(&self, other: &dyn NodeIdentifier) -> bool {
        other.session_key().as_deref() == Some(self.as_str())
    }
}

impl LogicalNodeId {
    pub fn instance_id(&self) -> InstanceId {
        InstanceId(self.instance_part().into())
    }

    pub fn logical_part(&self) -> &str {
        &self.0[INSTANCE_PART_LENGTH + 1..]
    }

    pub fn is_default_logical_node(&self) -> bool {
        self.logical_part() == DEFAULT_LOGICAL_NODE_PART
    }

    /// Creates a new, not yet registered session of this logical node.
    pub fn derive_session(&self) -> LogicalNodeSessionId {
        LogicalNodeSessionId(join_logical(&self.0, &random_session_part()))
    }

    /// Attaches the session part of `session`, which must belong to the same instance.
    pub fn combine_with_session(&self, session: &InstanceSessionId) -> Result<LogicalNodeSessionId> {
        if !self.is_same_instance_as(session) {
            return Err(Error::InstanceMismatch {
                left: self.to_string(),
                right: session.to_string(),
            });
        }
        Ok(LogicalNodeSessionId(join_logical(&self.0, session.session_part())))
    }
}

impl LogicalNodeSessionId {
    pub fn instance_id(&self) -> InstanceId {
        InstanceId(self.instance_part().into())
    }

    pub fn session_part(&self) -> &str {
        &self.0[self.0.len() - SESSION_PART_LENGTH..]
    }

    pub fn logical_part(&self) -> &str {
        &self.0[INSTANCE_PART_LENGTH + 1..self.0.len() - SESSION_PART_LENGTH - 1]
    }

    pub fn is_default_logical_node(&self) -> bool {
        self.logical_part() == DEFAULT_LOGICAL_NODE_PART
    }

    pub fn instance_session_id(&self) -> InstanceSessionId {
        InstanceSessionId(join_session(self.instance_part(), self.session_part()))
    }

    pub fn logical_node_id(&self) -> LogicalNodeId {
        LogicalNodeId(join_logical(self.instance_part(), self.logical_part()))
    }
}

impl NodeIdentifier for InstanceId {
    fn canonical(&self) -> &str {
        &self.0
    }

    fn kind(&self) -> IdKind {
        IdKind::Instance
    }

    fn session_part(&self) -> Option<&str> {
        None
    }

    fn logical_part(&self) -> Option<&str> {
        None
    }
}

impl NodeIdentifier for InstanceSessionId {
    fn canonical(&self) -> &str {
        &self.0
    }

    fn kind(&self) -> IdKind {
        IdKind::InstanceSession
    }

    fn session_part(&self) -> Option<&str> {
        Some(InstanceSessionId::session_part(self))
    }

    fn logical_part(&self) -> Option<&str> {
        None
    }

    fn session_key(&self) -> Option<String> {
        Some(self.0.to_string())
    }
}

impl NodeIdentifier for LogicalNodeId {
    fn canonical(&self) -> &str {
        &self.0
    }

    fn kind(&self) -> IdKind {
        IdKind::LogicalNode
    }

    fn session_part(&self) -> Option<&str> {
        None
    }

    fn logical_part(&self) -> Option<&str> {
        Some(LogicalNodeId::logical_part(self))
    }
}

impl NodeIdentifier for LogicalNodeSessionId {
    fn canonical(&self) -> &str {
        &self.0
    }

    fn kind(&self) -> IdKind {
        IdKind::LogicalNodeSession
    }

    fn session_part(&self) -> Option<&str> {
        Some(LogicalNodeSessionId::session_part(self))
    }

    fn logical_part(&self) -> Option<&str> {
        Some(LogicalNodeSessionId::logical_part(self))
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let kind = IdKind::Instance;
        check_instance_part(input, input, kind)?;
        Ok(InstanceId(input.into()))
    }
}

impl FromStr for InstanceSessionId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let kind = IdKind::InstanceSession;
        let (instance, session) = input
            .split_once(SESSION_SEPARATOR)
            .ok_or_else(|| Error::malformed(input, kind.description(), "missing '::' separator"))?;
        check_instance_part(input, instance, kind)?;
        check_session_part(input, session, kind)?;
        Ok(InstanceSessionId(input.into()))
    }
}

impl FromStr for LogicalNodeId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let kind = IdKind::LogicalNode;
        let (instance, logical) = input
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::malformed(input, kind.description(), "missing ':' separator"))?;
        check_instance_part(input, instance, kind)?;
        check_logical_part(input, logical, kind)?;
        Ok(LogicalNodeId(input.into()))
    }
}

impl FromStr for LogicalNodeSessionId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let kind = IdKind::LogicalNodeSession;
        let mut parts = input.splitn(3, SEPARATOR);
        let instance = parts.next().unwrap_or_default();
        let (logical, session) = match (parts.next(), parts.next()) {
            (Some(logical), Some(session)) => (logical, session),
            _ => {
                return Err(Error::malformed(
                    input,
                    kind.description(),
                    "expected two ':' separators",
                ))
            }
        };
        check_instance_part(input, instance, kind)?;
        check_logical_part(input, logical, kind)?;
        check_session_part(input, session, kind)?;
        Ok(LogicalNodeSessionId(input.into()))
    }
}

/// Any of the four id kinds.
///
/// The typed ids above are views over the variants; code that receives ids
/// of unknown kind (e.g. from the wire) parses into this type.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum NodeIdentity {
    Instance(InstanceId),
    InstanceSession(InstanceSessionId),
    LogicalNode(LogicalNodeId),
    LogicalNodeSession(LogicalNodeSessionId),
}

impl NodeIdentity {
    /// Parses any canonical id string, detecting the kind from its separators.
    pub fn parse(input: &str) -> Result<Self> {
        let separators = input.matches(SEPARATOR).count();
        let has_session_separator = input.contains(SESSION_SEPARATOR);
        match (separators, has_session_separator) {
            (0, _) => input.parse().map(NodeIdentity::Instance),
            (1, _) => input.parse().map(NodeIdentity::LogicalNode),
            (2, true) => input.parse().map(NodeIdentity::InstanceSession),
            (2, false) => input.parse().map(NodeIdentity::LogicalNodeSession),
            _ => Err(Error::malformed(
                input,
                "node id",
                format!("unexpected number of separators ({})", separators),
            )),
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        InstanceId(self.instance_part().into())
    }

    fn inner(&self) -> &dyn NodeIdentifier {
        match self {
            NodeIdentity::Instance(id) => id,
            NodeIdentity::InstanceSession(id) => id,
            NodeIdentity::LogicalNode(id) => id,
            NodeIdentity::LogicalNodeSession(id) => id,
        }
    }
}

impl NodeIdentifier for NodeIdentity {
    fn canonical(&self) -> &str {
        self.inner().canonical()
    }

    fn kind(&self) -> IdKind {
        self.inner().kind()
    }

    fn session_part(&self) -> Option<&str> {
        self.inner().session_part()
    }

    fn logical_part(&self) -> Option<&str> {
        self.inner().logical_part()
    }
}

impl FromStr for NodeIdentity {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        NodeIdentity::parse(input)
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

fn random_session_part() -> String {
    let raw: u64 = rand::thread_rng().gen_range(0..1u64 << (4 * SESSION_PART_LENGTH));
    format!("{:0width$x}", raw, width = SESSION_PART_LENGTH)
}

fn join_session(instance: &str, session: &str) -> Arc<str> {
    format!("{}{}{}", instance, SESSION_SEPARATOR, session).into()
}

fn join_logical(prefix: &str, suffix: &str) -> Arc<str> {
    format!("{}{}{}", prefix, SEPARATOR, suffix).into()
}

fn is_lower_hex(part: &str) -> bool {
    part.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn check_hex(input: &str, part: &str, kind: IdKind, name: &str) -> Result<()> {
    if part.contains(SEPARATOR) {
        return Err(Error::malformed(
            input,
            kind.description(),
            format!("unexpected separator in {}", name),
        ));
    }
    if !is_lower_hex(part) {
        return Err(Error::malformed(
            input,
            kind.description(),
            format!("{} must only contain lowercase hex characters", name),
        ));
    }
    Ok(())
}

fn check_instance_part(input: &str, part: &str, kind: IdKind) -> Result<()> {
    check_hex(input, part, kind, "instance part")?;
    if part.len() != INSTANCE_PART_LENGTH {
        return Err(Error::malformed(
            input,
            kind.description(),
            format!(
                "instance part must be {} characters long, found {}",
                INSTANCE_PART_LENGTH,
                part.len()
            ),
        ));
    }
    Ok(())
}

fn check_session_part(input: &str, part: &str, kind: IdKind) -> Result<()> {
    check_hex(input, part, kind, "session part")?;
    if part.len() != SESSION_PART_LENGTH {
        return Err(Error::malformed(
            input,
            kind.description(),
            format!(
                "session part must be {} characters long, found {}",
                SESSION_PART_LENGTH,
                part.len()
            ),
        ));
    }
    Ok(())
}

fn check_logical_part(input: &str, part: &str, kind: IdKind) -> Result<()> {
    if part.is_empty() {
        return Err(Error::malformed(input, kind.description(), "empty logical node part"));
    }
    check_hex(input, part, kind, "logical node part")?;
    if part.len() > MAXIMUM_LOGICAL_NODE_PART_LENGTH {
        return Err(Error::malformed(
            input,
            kind.description(),
            format!(
                "logical node part exceeds {} characters",
                MAXIMUM_LOGICAL_NODE_PART_LENGTH
            ),
        ));
    }
    Ok(())
}
