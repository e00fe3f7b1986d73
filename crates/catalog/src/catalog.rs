use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use plcwatch_protocol::messages::VariableReading;
use plcwatch_protocol::{
    DataType, DeclaredVariable, NodeId, Provenance, StatusCode, TagSession, TransportError,
    Variant, VariableDescriptor,
};

use crate::coerce::coerce;
use crate::error::{ReadError, WriteError};
use crate::sanitize::Sanitizer;

/// Merges declared and discovered descriptors into one list.
///
/// Declared entries come first and win on node-id collisions; within each
/// input the first entry per node id is kept.
pub fn merge(
    declared: Vec<VariableDescriptor>,
    discovered: Vec<VariableDescriptor>,
) -> Vec<VariableDescriptor> {
    let mut seen = HashSet::new();
    declared
        .into_iter()
        .chain(discovered)
        .filter(|d| seen.insert(d.node_id.clone()))
        .collect()
}

/// Variables known to one connection.
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    declared: Vec<DeclaredVariable>,
    discovered: Vec<VariableDescriptor>,
    sanitizer: Sanitizer,
}

impl VariableCatalog {
    pub fn new(declared: Vec<DeclaredVariable>, sanitizer: Sanitizer) -> Self {
        let mut catalog = Self {
            declared: Vec::with_capacity(declared.len()),
            discovered: Vec::new(),
            sanitizer,
        };
        for variable in declared {
            catalog.add_declared(variable);
        }
        catalog
    }

    pub fn declared(&self) -> &[DeclaredVariable] {
        &self.declared
    }

    pub fn discovered(&self) -> &[VariableDescriptor] {
        &self.discovered
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Adds or replaces a declared variable. Returns `true` if it was new.
    pub fn add_declared(&mut self, variable: DeclaredVariable) -> bool {
        match self
            .declared
            .iter_mut()
            .find(|v| v.node_id == variable.node_id)
        {
            Some(existing) => {
                *existing = variable;
                false
            }
            None => {
                self.declared.push(variable);
                true
            }
        }
    }

    /// Removes a declared variable. Returns `true` if it existed.
    pub fn remove_declared(&mut self, node: &NodeId) -> bool {
        let before = self.declared.len();
        self.declared.retain(|v| &v.node_id != node);
        self.declared.len() != before
    }

    /// Replaces the discovered set with sanitized copies of `variables`.
    pub fn set_discovered(&mut self, variables: Vec<VariableDescriptor>) {
        self.discovered = variables
            .into_iter()
            .map(|mut d| {
                d.name = self.sanitizer.sanitize(&d.name);
                d
            })
            .collect();
    }

    /// Clears discovery results, keeping declared variables.
    pub fn clear_discovered(&mut self) {
        self.discovered.clear();
    }

    /// Merged view: declared first, then discovered entries for other nodes.
    pub fn entries(&self) -> Vec<VariableDescriptor> {
        let declared = self
            .declared
            .iter()
            .map(|v| VariableDescriptor {
                name: self.sanitizer.sanitize(&v.name),
                node_id: v.node_id.clone(),
                data_type: DataType::Unknown,
                value: Variant::Null,
                description: v.description.clone(),
                provenance: Provenance::Declared,
                browse_path: None,
                error: None,
            })
            .collect();
        merge(declared, self.discovered.clone())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty() && self.discovered.is_empty()
    }
}

/// Reads one variable's current value.
pub async fn read_variable(
    session: &dyn TagSession,
    node: &NodeId,
    timeout: Duration,
) -> Result<VariableReading, ReadError> {
    let value = match tokio::time::timeout(timeout, session.read_value(node)).await {
        Ok(Ok(value)) => value,
        Ok(Err(source)) => {
            return Err(ReadError::Transport {
                node: node.clone(),
                source,
            });
        }
        Err(_) => {
            return Err(ReadError::Transport {
                node: node.clone(),
                source: TransportError::Timeout,
            });
        }
    };

    if !value.status.is_good() {
        return Err(ReadError::BadStatus {
            node: node.clone(),
            status: value.status,
        });
    }

    Ok(VariableReading {
        data_type: value.data_type(),
        value: value.value,
        source_timestamp: value.source_timestamp,
        server_timestamp: value.server_timestamp,
    })
}

/// Coerces `raw` to `data_type` and writes it.
///
/// Nothing is sent to the session when coercion fails.
pub async fn write_variable(
    session: &dyn TagSession,
    node: &NodeId,
    raw: &serde_json::Value,
    data_type: DataType,
    timeout: Duration,
) -> Result<StatusCode, WriteError> {
    let value = coerce(raw, data_type)?;
    debug!(node = %node, %data_type, ?value, "writing variable");

    let status = match tokio::time::timeout(timeout, session.write(node, value)).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(WriteError::Transport {
                node: node.clone(),
                source,
            });
        }
        Err(_) => {
            return Err(WriteError::Transport {
                node: node.clone(),
                source: TransportError::Timeout,
            });
        }
    };

    if !status.is_good() {
        warn!(node = %node, %status, "write rejected");
        return Err(WriteError::Rejected {
            node: node.clone(),
            status,
        });
    }
    Ok(status)
}
