use std::collections::HashSet;
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plcwatch_protocol::{
    BoxFuture, DataType, DataValue, DiscoveryFailure, NodeClass, NodeId, Provenance, Reference,
    StatusCode, TagSession, TransportError, Variant, VariableDescriptor,
};

use crate::types::{DiscoveryReport, ExplorerConfig};

/// Finds the variables a controller exposes.
///
/// Runs in two phases: a concurrent read of the configured probe ids, then
/// a depth-bounded traversal from the seed folders. Every call starts from
/// an empty visited set.
#[derive(Debug, Clone, Default)]
pub struct Explorer {
    config: ExplorerConfig,
}

/// Pending traversal step.
#[derive(Debug)]
struct WorkItem {
    node: NodeId,
    depth: usize,
    max_depth: usize,
    path: String,
}

/// State of a single exploration.
struct Run<'a> {
    config: &'a ExplorerConfig,
    session: &'a dyn TagSession,
    timeout: Duration,
    cancel: &'a CancellationToken,
    visited: HashSet<NodeId>,
    worklist: Vec<WorkItem>,
    variables: Vec<VariableDescriptor>,
    failures: Vec<DiscoveryFailure>,
}

impl Explorer {
    pub fn new(config: ExplorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Explores the session's address space.
    ///
    /// `timeout` bounds each browse and read call. Cancelling `cancel`
    /// abandons the remaining work; the interrupted node is reported as a
    /// failure and everything found so far is returned.
    pub async fn explore(
        &self,
        session: &dyn TagSession,
        preferred_namespace: u16,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> DiscoveryReport {
        let mut run = Run {
            config: &self.config,
            session,
            timeout,
            cancel,
            visited: HashSet::new(),
            worklist: Vec::new(),
            variables: Vec::new(),
            failures: Vec::new(),
        };

        let probed = run.probe().await;
        debug!(found = probed.len(), "probe phase done");

        for seed in self.config.seeds(preferred_namespace) {
            if cancel.is_cancelled() {
                break;
            }
            run.traverse(seed).await;
        }

        let mut seen = HashSet::new();
        let variables: Vec<VariableDescriptor> = probed
            .into_iter()
            .chain(run.variables)
            .filter(|v| seen.insert(v.node_id.clone()))
            .collect();

        info!(
            variables = variables.len(),
            failures = run.failures.len(),
            visited = run.visited.len(),
            "address space explored"
        );

        DiscoveryReport {
            variables,
            failures: run.failures,
            visited: run.visited.len(),
        }
    }
}

impl Run<'_> {
    /// Bounds a session call by the operation timeout and the cancel token.
    async fn call<T>(
        &self,
        fut: BoxFuture<'_, Result<T, TransportError>>,
    ) -> Result<T, TransportError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            result = tokio::time::timeout(self.timeout, fut) => {
                result.unwrap_or(Err(TransportError::Timeout))
            }
        }
    }

    async fn read(&self, node: &NodeId) -> Result<DataValue, TransportError> {
        let value = self.call(self.session.read_value(node)).await?;
        if value.status.is_good() {
            Ok(value)
        } else {
            Err(TransportError::BadStatus(value.status))
        }
    }

    /// Reads every probe id concurrently; misses are dropped silently.
    async fn probe(&self) -> Vec<VariableDescriptor> {
        let reads = self.config.probes.iter().map(|node| async move {
            match self.read(node).await {
                Ok(value) => {
                    let name = node.last_segment();
                    Some(VariableDescriptor {
                        description: format!("Main program variable: {name}"),
                        name,
                        node_id: node.clone(),
                        data_type: value.data_type(),
                        value: value.value,
                        provenance: Provenance::Discovered,
                        browse_path: Some(node.dotted_path()),
                        error: None,
                    })
                }
                Err(e) => {
                    debug!(node = %node, error = %e, "probe miss");
                    None
                }
            }
        });
        join_all(reads).await.into_iter().flatten().collect()
    }

    async fn traverse(&mut self, seed: NodeId) {
        self.worklist.push(WorkItem {
            node: seed,
            depth: 0,
            max_depth: self.config.max_depth,
            path: String::new(),
        });

        while let Some(item) = self.worklist.pop() {
            if item.depth > item.max_depth || self.visited.contains(&item.node) {
                continue;
            }
            self.visited.insert(item.node.clone());

            let references = match self.call(self.session.browse(&item.node)).await {
                Ok(refs) => refs,
                Err(TransportError::BadStatus(StatusCode::BAD_NODE_ID_UNKNOWN)) if item.depth == 0 => {
                    debug!(seed = %item.node, "seed not present");
                    continue;
                }
                Err(e) => {
                    warn!(node = %item.node, error = %e, "browse failed");
                    let cancelled = e == TransportError::Cancelled;
                    self.failures.push(DiscoveryFailure {
                        node_id: item.node,
                        error: e.to_string(),
                    });
                    if cancelled {
                        self.worklist.clear();
                        return;
                    }
                    continue;
                }
            };

            let mut folders = Vec::new();
            let mut variables = Vec::new();
            for reference in references {
                match reference.node_class {
                    NodeClass::Variable => {
                        if self.visited.insert(reference.node_id.clone()) {
                            variables.push(reference);
                        }
                    }
                    NodeClass::Object if !self.visited.contains(&reference.node_id) => {
                        folders.push(reference);
                    }
                    _ => {}
                }
            }

            self.read_children(&item.path, variables).await;

            let bonus_max = self.config.max_depth + self.config.depth_bonus;
            // Reversed so the stack pops children in browse order.
            for folder in folders.into_iter().rev() {
                let name = folder.name();
                let max_depth = if self.config.is_interesting_folder(name) {
                    item.max_depth.max(bonus_max)
                } else {
                    item.max_depth
                };
                self.worklist.push(WorkItem {
                    path: join_path(&item.path, name),
                    node: folder.node_id,
                    depth: item.depth + 1,
                    max_depth,
                });
            }
        }
    }

    async fn read_children(&mut self, parent_path: &str, children: Vec<Reference>) {
        if children.is_empty() {
            return;
        }
        let reads = join_all(children.iter().map(|r| self.read(&r.node_id))).await;

        for (reference, result) in children.into_iter().zip(reads) {
            let name = reference.name().to_string();
            let browse_path = Some(join_path(parent_path, &name));
            let description = if reference.display_name.is_empty() {
                name.clone()
            } else {
                reference.display_name.clone()
            };

            match result {
                Ok(value) => {
                    if self.config.filter.is_system(&reference.node_id, &name) {
                        continue;
                    }
                    self.variables.push(VariableDescriptor {
                        name,
                        node_id: reference.node_id,
                        data_type: value.data_type(),
                        value: value.value,
                        description,
                        provenance: Provenance::Discovered,
                        browse_path,
                        error: None,
                    });
                }
                Err(e) if self.config.keep_failed(&reference.node_id, &name) => {
                    debug!(node = %reference.node_id, error = %e, "keeping unreadable variable");
                    self.variables.push(VariableDescriptor {
                        name,
                        node_id: reference.node_id,
                        data_type: DataType::Unknown,
                        value: Variant::Null,
                        description,
                        provenance: Provenance::Discovered,
                        browse_path,
                        error: Some(e.to_string()),
                    });
                }
                Err(e) => {
                    debug!(node = %reference.node_id, error = %e, "skipping unreadable variable");
                }
            }
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use plcwatch_protocol::{ConnectOptions, RetryPolicy, TagClient};
    use plcwatch_sim::{SimClient, SimServer};

    use crate::filter::FilterPolicy;

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn open(server: Arc<SimServer>) -> Arc<dyn TagSession> {
        let client = SimClient::new();
        client.register("opc.tcp://plc:4840", server);
        let options = ConnectOptions {
            retry: RetryPolicy::none(),
            ..ConnectOptions::default()
        };
        client.connect("opc.tcp://plc:4840", &options).await.unwrap()
    }

    fn names(report: &DiscoveryReport) -> Vec<String> {
        report.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// Explorer with no probes, traversing namespace 0 only.
    fn traversal_only(max_depth: usize, depth_bonus: usize) -> Explorer {
        Explorer::new(ExplorerConfig {
            probes: Vec::new(),
            namespaces: vec![0],
            max_depth,
            depth_bonus,
            ..ExplorerConfig::default()
        })
    }

    #[tokio::test]
    async fn demo_space_yields_unique_program_variables() {
        let server = Arc::new(SimServer::demo());
        let session = open(Arc::clone(&server)).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        let mut ids: Vec<_> = report.variables.iter().map(|v| v.node_id.clone()).collect();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate node ids in report");

        // 7 main.* variables plus 3 library tags; system ones filtered.
        assert_eq!(total, 10);
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        let found = names(&report);
        assert!(found.contains(&"power_on".to_string()));
        assert!(found.contains(&"ST_PRG_WITH_RS_LIB.counter".to_string()));
        assert!(!found.contains(&"ServerStatus".to_string()));
    }

    #[tokio::test]
    async fn probe_hits_come_first_with_dotted_paths() {
        let server = Arc::new(SimServer::demo());
        let session = open(server).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        let first = &report.variables[0];
        assert_eq!(first.node_id, NodeId::string(1, "main.power_on"));
        assert_eq!(first.name, "power_on");
        assert_eq!(first.description, "Main program variable: power_on");
        assert_eq!(first.browse_path.as_deref(), Some("main/power_on"));
    }

    #[tokio::test]
    async fn no_node_is_browsed_twice_despite_cycle() {
        let server = Arc::new(SimServer::demo());
        let session = open(Arc::clone(&server)).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        for node in [
            SimServer::root(),
            SimServer::objects(),
            NodeId::string(1, "PLC"),
            NodeId::string(1, "main"),
        ] {
            assert_eq!(server.browse_count(&node), 1, "{node} browsed more than once");
        }
        assert!(report.visited > 0);
    }

    /// Builds Objects/d1/d2/.../dN with one variable per level.
    fn chain(server: &SimServer, prefix: &str, levels: usize) {
        let mut parent = SimServer::objects();
        for level in 1..=levels {
            let folder = NodeId::string(2, format!("{prefix}{level}"));
            server.add_folder(&parent, folder.clone(), &format!("{prefix}{level}"));
            server.add_variable(
                &folder,
                NodeId::string(2, format!("{prefix}{level}.v")),
                &format!("{prefix}{level}_v"),
                Variant::Int32(level as i32),
            );
            parent = folder;
        }
    }

    #[tokio::test]
    async fn depth_bound_is_respected() {
        let server = Arc::new(SimServer::new());
        chain(&server, "d", 8);
        let session = open(Arc::clone(&server)).await;

        // Objects is at depth 1 from Root, d1 at depth 2, ...
        let report = traversal_only(3, 2)
            .explore(session.as_ref(), 0, TIMEOUT, &CancellationToken::new())
            .await;

        let found = names(&report);
        assert_eq!(found, vec!["d1_v", "d2_v"]);
        assert_eq!(server.browse_count(&NodeId::string(2, "d3")), 0);
    }

    #[tokio::test]
    async fn keyword_bonus_applies_only_along_matching_branch() {
        let server = Arc::new(SimServer::new());
        chain(&server, "d", 8);
        chain(&server, "main_", 8);
        let session = open(Arc::clone(&server)).await;

        let report = traversal_only(3, 2)
            .explore(session.as_ref(), 0, TIMEOUT, &CancellationToken::new())
            .await;

        let found = names(&report);
        // Plain branch stops at the base bound.
        assert!(found.contains(&"d2_v".to_string()));
        assert!(!found.contains(&"d3_v".to_string()));
        // Keyword branch gets +2 once, not once per matching folder.
        assert!(found.contains(&"main_4_v".to_string()));
        assert!(!found.contains(&"main_5_v".to_string()));
        assert_eq!(server.browse_count(&NodeId::string(2, "main_5")), 0);
    }

    #[tokio::test]
    async fn browse_failure_is_recorded_and_traversal_continues() {
        let server = Arc::new(SimServer::demo());
        server.fail_browse(
            NodeId::string(1, "ST_PRG_WITH_RS_LIB"),
            TransportError::Other("subtree unavailable".into()),
        );
        let session = open(Arc::clone(&server)).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node_id, NodeId::string(1, "ST_PRG_WITH_RS_LIB"));
        assert!(report.failures[0].error.contains("subtree unavailable"));
        assert!(names(&report).contains(&"toggle".to_string()));
        assert!(!names(&report).contains(&"ST_PRG_WITH_RS_LIB.counter".to_string()));
    }

    #[tokio::test]
    async fn failed_reads_kept_only_for_interesting_nodes() {
        let server = Arc::new(SimServer::demo());
        let q1 = NodeId::string(1, "main.q1");
        let counter = NodeId::string(1, "ST_PRG_WITH_RS_LIB.counter");
        server.fail_read(q1.clone(), TransportError::Other("read refused".into()));
        server.fail_read(counter.clone(), TransportError::Other("read refused".into()));
        let session = open(server).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        let kept = report
            .variables
            .iter()
            .find(|v| v.node_id == q1)
            .expect("main.q1 kept");
        assert_eq!(kept.data_type, DataType::Unknown);
        assert!(kept.error.as_deref().is_some_and(|e| e.contains("read refused")));
        assert!(report.variables.iter().all(|v| v.node_id != counter));
    }

    #[tokio::test]
    async fn permissive_filter_reports_system_variables() {
        let server = Arc::new(SimServer::demo());
        let session = open(server).await;

        let explorer = Explorer::new(ExplorerConfig {
            probes: Vec::new(),
            filter: FilterPolicy::permissive(),
            ..ExplorerConfig::default()
        });
        let report = explorer
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;
        assert!(names(&report).contains(&"ServerStatus".to_string()));
    }

    #[tokio::test]
    async fn cancelled_run_returns_partial_report() {
        let server = Arc::new(SimServer::demo());
        let session = open(server).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &cancel)
            .await;

        assert!(report.variables.is_empty());
        assert_eq!(report.visited, 0);
    }

    #[tokio::test]
    async fn cancel_mid_traversal_records_interrupted_node() {
        let server = Arc::new(SimServer::demo());
        let session = open(Arc::clone(&server)).await;
        let cancel = CancellationToken::new();

        let explorer = Explorer::new(ExplorerConfig {
            probes: Vec::new(),
            ..ExplorerConfig::default()
        });
        let explore = explorer.explore(session.as_ref(), 1, TIMEOUT, &cancel);
        let canceller = async {
            // Let the first few browse calls through.
            while server.total_browses() < 4 {
                tokio::task::yield_now().await;
            }
            cancel.cancel();
        };
        let (report, ()) = tokio::join!(explore, canceller);

        assert!(
            report
                .failures
                .iter()
                .any(|f| f.error == TransportError::Cancelled.to_string()),
            "{:?}",
            report.failures
        );
        assert!(server.total_browses() < 18);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reads_time_out_per_call() {
        let server = Arc::new(SimServer::demo());
        server.delay_read(NodeId::string(1, "main.A1"), Duration::from_secs(60));
        let session = open(server).await;

        let report = Explorer::default()
            .explore(session.as_ref(), 1, TIMEOUT, &CancellationToken::new())
            .await;

        let a1 = report
            .variables
            .iter()
            .find(|v| v.node_id == NodeId::string(1, "main.A1"))
            .expect("main.A1 kept as interesting");
        assert_eq!(
            a1.error.as_deref(),
            Some(TransportError::Timeout.to_string().as_str())
        );
    }
}
