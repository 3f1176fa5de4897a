//! Error information attached to failed network responses.
//!
//! The record is `(error id, reporting node id)`; both fields may be empty.
//! On the wire the fields are joined by `,` and each occurrence of `\` or
//! `,` inside a field is preceded by `\`.

use crate::error::{Result, RpcError};

const SEPARATOR: char = ',';
const ESCAPE: char = '\\';

/// Correlation data pointing at a log entry on the reporting node.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ErrorInfo {
    /// Marker of the logged error, e.g. `E#0000004711`.
    pub error_id: String,
    /// Canonical instance session id of the node that logged it.
    pub reporting_node: String,
}

impl ErrorInfo {
    pub fn new(error_id: impl Into<String>, reporting_node: impl Into<String>) -> Self {
        Self {
            error_id: error_id.into(),
            reporting_node: reporting_node.into(),
        }
    }

    pub fn encode(&self) -> String {
        join_escaped(&[self.error_id.as_str(), self.reporting_node.as_str()])
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let mut fields = split_unescaped(raw);
        if fields.len() != 2 {
            return Err(RpcError::MalformedErrorInfo(raw.to_string()));
        }
        let reporting_node = fields.pop().unwrap_or_default();
        let error_id = fields.pop().unwrap_or_default();
        Ok(Self {
            error_id,
            reporting_node,
        })
    }
}

/// Escapes each field and joins them with `,`.
pub fn join_escaped(fields: &[&str]) -> String {
    let mut joined = String::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            joined.push(SEPARATOR);
        }
        for c in field.chars() {
            if c == SEPARATOR || c == ESCAPE {
                joined.push(ESCAPE);
            }
            joined.push(c);
        }
    }
    joined
}

/// Splits at unescaped `,` and removes the escapes.
///
/// A trailing lone `\` is kept as a literal character.
pub fn split_unescaped(raw: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            ESCAPE => current.push(chars.next().unwrap_or(ESCAPE)),
            SEPARATOR => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
