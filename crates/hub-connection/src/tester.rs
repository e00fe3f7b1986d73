//! Endpoint diagnostics: single-endpoint tests and port scans.

use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, info};

use plcwatch_protocol::messages::{EndpointReport, ScanReport};
use plcwatch_protocol::{ConnectOptions, RetryPolicy, TagClient, TransportError};

use crate::classify::connect_failure;
use crate::types::Timeouts;

/// Opens and closes a session on `endpoint`, reporting how it went.
///
/// Never retries; the connect timeout bounds the whole attempt.
pub async fn test_endpoint(client: &dyn TagClient, endpoint: &str, timeouts: Timeouts) -> EndpointReport {
    let options = ConnectOptions {
        retry: RetryPolicy::none(),
        session_timeout: timeouts.session,
    };
    let started = Instant::now();
    let result = tokio::time::timeout(timeouts.connect, client.connect(endpoint, &options))
        .await
        .unwrap_or(Err(TransportError::Timeout));

    match result {
        Ok(session) => {
            let elapsed = started.elapsed();
            if let Ok(Err(e)) = tokio::time::timeout(timeouts.operation, session.close()).await {
                debug!(endpoint, error = %e, "closing test session failed");
            }
            info!(endpoint, elapsed_ms = elapsed.as_millis() as u64, "endpoint test succeeded");
            EndpointReport {
                endpoint: endpoint.to_string(),
                success: true,
                message: "Connection test succeeded".into(),
                connect_time_ms: Some(elapsed.as_millis() as u64),
                failure: None,
            }
        }
        Err(e) => {
            let failure = connect_failure(&e);
            info!(endpoint, category = %failure.category, "endpoint test failed");
            EndpointReport {
                endpoint: endpoint.to_string(),
                success: false,
                message: format!("Connection test failed: {e}"),
                connect_time_ms: None,
                failure: Some(failure),
            }
        }
    }
}

/// Tests `<scheme>://<host>:<port>` for every port concurrently.
///
/// `base_url` must carry a scheme. Successful endpoints are listed first.
pub async fn scan_endpoints(
    client: &dyn TagClient,
    base_url: &str,
    ports: &[u16],
    timeouts: Timeouts,
) -> ScanReport {
    let Some((scheme, host)) = base_url.split_once("://").filter(|(s, h)| !s.is_empty() && !h.is_empty())
    else {
        return ScanReport {
            success: false,
            message: format!("Invalid base URL: {base_url}"),
            results: Vec::new(),
        };
    };

    let host = host.trim_end_matches('/');
    let endpoints: Vec<String> = ports.iter().map(|p| format!("{scheme}://{host}:{p}")).collect();
    let mut results = join_all(
        endpoints
            .iter()
            .map(|endpoint| test_endpoint(client, endpoint, timeouts)),
    )
    .await;
    // Stable: ports keep their order within each group.
    results.sort_by_key(|r| !r.success);

    let success = results.iter().any(|r| r.success);
    ScanReport {
        success,
        message: if success {
            "Found reachable endpoints".into()
        } else {
            "No reachable endpoint found".into()
        },
        results,
    }
}
