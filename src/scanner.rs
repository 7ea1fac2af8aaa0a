use crate::plan::{ScanPlan, RANGE_MAX, RANGE_MIN};
use crate::types::{
    DeviceRecord, FailureKind, ProbeOutcome, ScanMeta, ScanResponse, VendorEnvelope,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Probe every host number in the plan's range concurrently and wait for
/// all probes to settle.
///
/// - Limits concurrent probes using a `Semaphore`; the default cap of 254
///   is effectively unbounded for a /24.
/// - Each probe is a single GET to the vendor liveness endpoint with a
///   hard timeout; nothing is retried.
/// - This is a join point, not a stream: it returns only once the slowest
///   probe has completed or timed out, in completion order.
/// - Cancelling the token (or dropping the returned future) abandons the
///   remaining probes and releases their sockets.
pub async fn probe_all(
    client: &Client,
    plan: &ScanPlan,
    concurrency: usize,
    cancel: CancellationToken,
) -> Vec<ProbeOutcome> {
    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, 1024)));
    let mut set = JoinSet::new();

    for i in plan.range_start..=plan.range_end {
        if cancel.is_cancelled() {
            break;
        }
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let client = client.clone();
        let host = format!("{}{}", plan.subnet_prefix, i);
        let port = plan.port;
        let timeout = plan.probe_timeout;
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until the probe completes

            tokio::select! {
                _ = cancel.cancelled() => None,
                outcome = probe_host(&client, &host, port, timeout) => Some(outcome),
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(res) = set.join_next().await {
        if let Ok(Some(outcome)) = res {
            outcomes.push(outcome);
        }
    }

    let alive = outcomes.iter().filter(|o| o.alive).count();
    debug!(probed = outcomes.len(), alive, "scan settled");
    outcomes
}

/// Issue one liveness request against `host:port` and classify the result.
///
/// A parsed envelope with status 0 means a live device; refusals and
/// timeouts are expected on most of a /24 and are not errors here.
pub async fn probe_host(client: &Client, host: &str, port: u16, timeout: Duration) -> ProbeOutcome {
    let url = format!("http://{host}:{port}/request");
    let sent = client
        .get(&url)
        .query(&[("action", "isalive")])
        .timeout(timeout)
        .send()
        .await;

    let resp = match sent {
        Ok(resp) => resp,
        Err(e) => {
            let failure = if e.is_timeout() {
                FailureKind::Timeout
            } else if e.is_connect() {
                FailureKind::ConnectionRefused
            } else {
                FailureKind::ProtocolError
            };
            return dead(host, port, failure);
        }
    };

    match resp.json::<VendorEnvelope>().await {
        Ok(envelope) if envelope.status == 0 => {
            let device_name = envelope
                .data
                .as_ref()
                .and_then(|d| d.get("devicename"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            debug!(host, %device_name, "device responded");
            ProbeOutcome {
                host: host.to_string(),
                port,
                alive: true,
                device_name,
                raw: envelope.data,
                failure: FailureKind::None,
            }
        }
        Ok(_) => dead(host, port, FailureKind::ProtocolError),
        Err(e) if e.is_timeout() => dead(host, port, FailureKind::Timeout),
        Err(_) => dead(host, port, FailureKind::ProtocolError),
    }
}

fn dead(host: &str, port: u16, failure: FailureKind) -> ProbeOutcome {
    ProbeOutcome {
        host: host.to_string(),
        port,
        alive: false,
        device_name: String::new(),
        raw: None,
        failure,
    }
}

/// Join-point projection: keep live outcomes in the order their probes
/// completed and attach the effective scan parameters.
pub fn aggregate(outcomes: Vec<ProbeOutcome>, plan: &ScanPlan) -> ScanResponse {
    let devices: Vec<DeviceRecord> = outcomes
        .into_iter()
        .filter(|o| o.alive)
        .map(|o| DeviceRecord {
            devicename: o.device_name,
            ip: o.host.clone(),
            host: o.host,
            port: o.port,
        })
        .collect();

    let success = !devices.is_empty();
    let error = if success {
        None
    } else {
        Some(format!(
            "no devices found on {}{}-{}",
            plan.subnet_prefix, plan.range_start, plan.range_end
        ))
    };

    ScanResponse {
        success,
        devices,
        meta: ScanMeta {
            subnet: plan.subnet_prefix.clone(),
            range_start: plan.range_start,
            range_end: plan.range_end,
            port: plan.port,
            needs_subnet: false,
        },
        error,
    }
}

/// Scan response for the case where no subnet could be derived and none
/// was supplied: no probes were issued, the caller must pick a subnet.
pub fn needs_subnet_response(port: u16) -> ScanResponse {
    ScanResponse {
        success: false,
        devices: Vec::new(),
        meta: ScanMeta {
            subnet: String::new(),
            range_start: RANGE_MIN,
            range_end: RANGE_MAX,
            port,
            needs_subnet: true,
        },
        error: Some(
            "the server is not on a private network; supply a subnet (e.g. 192.168.1) to scan"
                .to_string(),
        ),
    }
}

/// Look up one device's advertised name via the liveness endpoint,
/// falling back to an "unknown" sentinel on any failure.
pub async fn device_name(client: &Client, host: &str, port: u16, timeout: Duration) -> String {
    let outcome = probe_host(client, host, port, timeout).await;
    if outcome.alive && !outcome.device_name.is_empty() {
        outcome.device_name
    } else {
        "unknown".to_string()
    }
}
