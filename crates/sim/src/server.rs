use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use plcwatch_protocol::constants::{OBJECTS_FOLDER, ROOT_FOLDER, SERVER_FOLDER};
use plcwatch_protocol::{
    DataValue, NodeClass, NodeId, Reference, StatusCode, TransportError, Variant,
};

#[derive(Debug, Clone)]
struct SimNode {
    class: NodeClass,
    browse_name: String,
    display_name: String,
    children: Vec<NodeId>,
    value: Option<DataValue>,
    writable: bool,
}

#[derive(Debug, Default)]
struct AddressSpace {
    nodes: HashMap<NodeId, SimNode>,
    browse_failures: HashMap<NodeId, TransportError>,
    read_failures: HashMap<NodeId, TransportError>,
    read_delays: HashMap<NodeId, Duration>,
    browse_counts: HashMap<NodeId, usize>,
    total_browses: usize,
}

/// Simulated controller address space.
///
/// Starts with the standard RootFolder → Objects → Server skeleton in
/// namespace 0. Nodes are added under existing parents; a node may be
/// referenced from several parents to build cycles.
#[derive(Debug)]
pub struct SimServer {
    space: Mutex<AddressSpace>,
}

impl Default for SimServer {
    fn default() -> Self {
        Self::new()
    }
}

impl SimServer {
    /// Creates the standard folder skeleton.
    pub fn new() -> Self {
        let server = Self {
            space: Mutex::new(AddressSpace::default()),
        };
        server.insert(None, Self::root(), NodeClass::Object, "Root", None, false);
        server.add_folder(&Self::root(), Self::objects(), "Objects");
        server.add_folder(&Self::objects(), Self::server_folder(), "Server");
        server
    }

    pub fn root() -> NodeId {
        NodeId::numeric(0, ROOT_FOLDER)
    }

    pub fn objects() -> NodeId {
        NodeId::numeric(0, OBJECTS_FOLDER)
    }

    pub fn server_folder() -> NodeId {
        NodeId::numeric(0, SERVER_FOLDER)
    }

    /// A small controller program: server diagnostics, a `main` program
    /// folder, library-prefixed tags and a reference cycle.
    pub fn demo() -> Self {
        let server = Self::new();

        server.add_read_only_variable(
            &Self::server_folder(),
            NodeId::numeric(0, 2256),
            "ServerStatus",
            Variant::String("Running".into()),
        );
        server.add_read_only_variable(
            &Self::server_folder(),
            NodeId::numeric(0, 2267),
            "ServiceLevel",
            Variant::Byte(255),
        );

        let plc = NodeId::string(1, "PLC");
        let main = NodeId::string(1, "main");
        server.add_folder(&Self::objects(), plc.clone(), "PLC");
        server.add_folder(&plc, main.clone(), "main");
        for (name, value) in [
            ("power_on", Variant::Boolean(false)),
            ("start_demo", Variant::Boolean(false)),
            ("stop", Variant::Boolean(false)),
            ("reset", Variant::Boolean(false)),
            ("toggle", Variant::Boolean(true)),
            ("A1", Variant::Double(0.0)),
            ("q1", Variant::Int16(0)),
        ] {
            server.add_variable(&main, NodeId::string(1, format!("main.{name}")), name, value);
        }
        // main links back to its parent.
        server.add_reference(&main, &plc);

        let lib = NodeId::string(1, "ST_PRG_WITH_RS_LIB");
        server.add_folder(&plc, lib.clone(), "ST_PRG_WITH_RS_LIB");
        for (name, value) in [
            ("counter", Variant::Int32(0)),
            ("spectrum_peak", Variant::Double(0.0)),
            ("anomaly", Variant::Boolean(false)),
        ] {
            let full = format!("ST_PRG_WITH_RS_LIB.{name}");
            server.add_variable(&lib, NodeId::string(1, full.clone()), &full, value);
        }

        server
    }

    /// Adds an object/folder node under `parent`.
    pub fn add_folder(&self, parent: &NodeId, node: NodeId, name: &str) {
        self.insert(Some(parent), node, NodeClass::Object, name, None, false);
    }

    /// Adds a writable variable under `parent`.
    pub fn add_variable(&self, parent: &NodeId, node: NodeId, name: &str, value: Variant) {
        self.insert(
            Some(parent),
            node,
            NodeClass::Variable,
            name,
            Some(DataValue::good(value)),
            true,
        );
    }

    /// Adds a read-only variable under `parent`.
    pub fn add_read_only_variable(&self, parent: &NodeId, node: NodeId, name: &str, value: Variant) {
        self.insert(
            Some(parent),
            node,
            NodeClass::Variable,
            name,
            Some(DataValue::good(value)),
            false,
        );
    }

    /// Adds an extra reference from `parent` to an existing `child`.
    pub fn add_reference(&self, parent: &NodeId, child: &NodeId) {
        let mut space = self.lock();
        if let Some(p) = space.nodes.get_mut(parent) {
            p.children.push(child.clone());
        }
    }

    /// Makes every browse of `node` fail with `error`.
    pub fn fail_browse(&self, node: NodeId, error: TransportError) {
        self.lock().browse_failures.insert(node, error);
    }

    /// Makes every read of `node` fail with `error`.
    pub fn fail_read(&self, node: NodeId, error: TransportError) {
        self.lock().read_failures.insert(node, error);
    }

    /// Clears an injected read failure.
    pub fn heal_read(&self, node: &NodeId) {
        self.lock().read_failures.remove(node);
    }

    /// Delays every read of `node`.
    pub fn delay_read(&self, node: NodeId, delay: Duration) {
        self.lock().read_delays.insert(node, delay);
    }

    /// Replaces a variable's value.
    pub fn set_value(&self, node: &NodeId, value: Variant) {
        let mut space = self.lock();
        if let Some(n) = space.nodes.get_mut(node) {
            n.value = Some(DataValue::good(value));
        }
    }

    /// Current value of a variable.
    pub fn value(&self, node: &NodeId) -> Option<Variant> {
        self.lock()
            .nodes
            .get(node)
            .and_then(|n| n.value.as_ref())
            .map(|v| v.value.clone())
    }

    /// How many times `node` has been browsed.
    pub fn browse_count(&self, node: &NodeId) -> usize {
        self.lock().browse_counts.get(node).copied().unwrap_or(0)
    }

    /// Total number of browse calls served.
    pub fn total_browses(&self) -> usize {
        self.lock().total_browses
    }

    pub(crate) fn browse(&self, node: &NodeId) -> Result<Vec<Reference>, TransportError> {
        let mut space = self.lock();
        space.total_browses += 1;
        *space.browse_counts.entry(node.clone()).or_default() += 1;

        if let Some(err) = space.browse_failures.get(node) {
            return Err(err.clone());
        }
        let parent = space
            .nodes
            .get(node)
            .ok_or(TransportError::BadStatus(StatusCode::BAD_NODE_ID_UNKNOWN))?;

        Ok(parent
            .children
            .iter()
            .filter_map(|child| {
                space.nodes.get(child).map(|c| Reference {
                    node_id: child.clone(),
                    node_class: c.class,
                    browse_name: c.browse_name.clone(),
                    display_name: c.display_name.clone(),
                })
            })
            .collect())
    }

    pub(crate) fn read_delay(&self, node: &NodeId) -> Option<Duration> {
        self.lock().read_delays.get(node).copied()
    }

    pub(crate) fn read(&self, node: &NodeId) -> Result<DataValue, TransportError> {
        let space = self.lock();
        if let Some(err) = space.read_failures.get(node) {
            return Err(err.clone());
        }
        Ok(match space.nodes.get(node) {
            Some(SimNode {
                value: Some(value), ..
            }) => value.clone(),
            Some(_) => DataValue::bad(StatusCode::BAD_NOT_READABLE),
            None => DataValue::bad(StatusCode::BAD_NODE_ID_UNKNOWN),
        })
    }

    pub(crate) fn write(&self, node: &NodeId, value: Variant) -> StatusCode {
        let mut space = self.lock();
        let Some(target) = space.nodes.get_mut(node) else {
            return StatusCode::BAD_NODE_ID_UNKNOWN;
        };
        let Some(current) = target.value.as_ref() else {
            return StatusCode::BAD_NOT_WRITABLE;
        };
        if !target.writable {
            return StatusCode::BAD_NOT_WRITABLE;
        }

        let expected = current.value.data_type();
        let value = match value {
            Variant::Raw(raw) => match adapt_raw(raw, &current.value) {
                Some(v) => v,
                None => return StatusCode::BAD_TYPE_MISMATCH,
            },
            v => v,
        };
        if value.data_type() != expected {
            return StatusCode::BAD_TYPE_MISMATCH;
        }

        tracing::trace!(node = %node, ?value, "sim write");
        target.value = Some(DataValue::good(value));
        StatusCode::GOOD
    }

    fn insert(
        &self,
        parent: Option<&NodeId>,
        node: NodeId,
        class: NodeClass,
        name: &str,
        value: Option<DataValue>,
        writable: bool,
    ) {
        let mut space = self.lock();
        if let Some(p) = parent.and_then(|p| space.nodes.get_mut(p)) {
            p.children.push(node.clone());
        }
        space.nodes.insert(
            node,
            SimNode {
                class,
                browse_name: name.to_string(),
                display_name: name.to_string(),
                children: Vec::new(),
                value,
                writable,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AddressSpace> {
        // A poisoned lock only means a test panicked mid-mutation.
        self.space.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Converts an untyped JSON value to the type already stored in the node.
fn adapt_raw(raw: serde_json::Value, current: &Variant) -> Option<Variant> {
    use serde_json::Value;
    Some(match (current, raw) {
        (Variant::Boolean(_), Value::Bool(b)) => Variant::Boolean(b),
        (Variant::String(_), Value::String(s)) => Variant::String(s),
        (Variant::Double(_), Value::Number(n)) => Variant::Double(n.as_f64()?),
        (Variant::Float(_), Value::Number(n)) => Variant::Float(n.as_f64()? as f32),
        (Variant::Int16(_), Value::Number(n)) => Variant::Int16(i16::try_from(n.as_i64()?).ok()?),
        (Variant::Int32(_), Value::Number(n)) => Variant::Int32(i32::try_from(n.as_i64()?).ok()?),
        (Variant::Int64(_), Value::Number(n)) => Variant::Int64(n.as_i64()?),
        (Variant::UInt16(_), Value::Number(n)) => Variant::UInt16(u16::try_from(n.as_u64()?).ok()?),
        (Variant::UInt32(_), Value::Number(n)) => Variant::UInt32(u32::try_from(n.as_u64()?).ok()?),
        (Variant::UInt64(_), Value::Number(n)) => Variant::UInt64(n.as_u64()?),
        (Variant::Raw(_), raw) => Variant::Raw(raw),
        _ => return None,
    })
}
