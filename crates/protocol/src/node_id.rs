//! Node identifiers in the `ns=<index>;<kind>=<value>` text form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// `i=<u32>`
    Numeric(u32),
    /// `s=<text>`
    String(String),
    /// `g=<guid>`
    Guid(String),
    /// `b=<base64>`
    Opaque(String),
}

/// Unique address-space key of one node within a namespace.
///
/// Parsed from and rendered to the textual form used by controllers,
/// e.g. `ns=1;s=main.power_on` or `i=2253`. Namespace 0 is rendered
/// without the `ns=` prefix, so `ns=0;i=85` and `i=85` are the same node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

/// Error returned when a node id string is malformed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeIdParseError {
    #[error("empty node id")]
    Empty,

    #[error("invalid namespace index in '{0}'")]
    Namespace(String),

    #[error("unknown identifier kind in '{0}'")]
    Kind(String),

    #[error("invalid numeric identifier in '{0}'")]
    Numeric(String),
}

impl NodeId {
    /// Creates a numeric node id.
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(id),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(id.into()),
        }
    }

    /// Returns the numeric identifier, if this is a numeric node.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the raw identifier text (without the kind prefix).
    pub fn identifier_text(&self) -> String {
        match &self.identifier {
            Identifier::Numeric(n) => n.to_string(),
            Identifier::String(s) | Identifier::Guid(s) | Identifier::Opaque(s) => s.clone(),
        }
    }

    /// Returns the final `.`-separated segment of the identifier.
    ///
    /// `ns=1;s=main.power_on` yields `power_on`.
    pub fn last_segment(&self) -> String {
        let text = self.identifier_text();
        text.rsplit('.').next().unwrap_or(&text).to_string()
    }

    /// Returns the identifier's `.`-separated segments joined with `/`.
    pub fn dotted_path(&self) -> String {
        self.identifier_text().split('.').collect::<Vec<_>>().join("/")
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "i={n}"),
            Identifier::String(s) => write!(f, "s={s}"),
            Identifier::Guid(g) => write!(f, "g={g}"),
            Identifier::Opaque(b) => write!(f, "b={b}"),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == 0 {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "ns={};{}", self.namespace, self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.is_empty() {
            return Err(NodeIdParseError::Empty);
        }

        let (namespace, rest) = match text.strip_prefix("ns=") {
            Some(after) => {
                let (ns, rest) = after
                    .split_once(';')
                    .ok_or_else(|| NodeIdParseError::Namespace(s.to_string()))?;
                let ns = ns
                    .parse::<u16>()
                    .map_err(|_| NodeIdParseError::Namespace(s.to_string()))?;
                (ns, rest)
            }
            None => (0, text),
        };

        let (kind, value) = rest
            .split_once('=')
            .ok_or_else(|| NodeIdParseError::Kind(s.to_string()))?;

        let identifier = match kind {
            "i" => Identifier::Numeric(
                value
                    .parse::<u32>()
                    .map_err(|_| NodeIdParseError::Numeric(s.to_string()))?,
            ),
            "s" => Identifier::String(value.to_string()),
            "g" => Identifier::Guid(value.to_string()),
            "b" => Identifier::Opaque(value.to_string()),
            _ => return Err(NodeIdParseError::Kind(s.to_string())),
        };

        Ok(Self {
            namespace,
            identifier,
        })
    }
}

impl TryFrom<String> for NodeId {
    type Error = NodeIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(value: NodeId) -> Self {
        value.to_string()
    }
}
