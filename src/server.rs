use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    netdetect::{self, InterfaceSource},
    plan::{self, PlanError, PlanOutcome},
    relay::{self, RelayAction, RelayRequest},
    scanner,
    types::{DeviceNameResponse, LocalIpInfo, ScanMeta, ScanResponse, VendorEnvelope},
};

/// Shared server state: one HTTP client for all outbound vendor calls,
/// the injected interface source, and the scan limits fixed at startup.
#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub interfaces: Arc<dyn InterfaceSource>,
    pub probe_concurrency: usize,
    pub probe_timeout: Duration,
    pub relay_timeout: Duration,
}

impl AppState {
    pub fn new(
        interfaces: Arc<dyn InterfaceSource>,
        probe_concurrency: usize,
        probe_timeout: Duration,
        relay_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            // Devices live on the LAN; never route probes through a proxy.
            client: Client::builder().no_proxy().build()?,
            interfaces,
            probe_concurrency,
            probe_timeout,
            relay_timeout,
        })
    }
}

/// The API surface. Static UI assets and layering are added by
/// [`spawn_server`]; tests drive this router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scan", get(get_scan))
        .route("/api/local-ip", get(get_local_ip))
        .route("/api/get-device-name", get(get_device_name))
        .route("/tv/key", get(tv_key))
        .route("/tv/apps", get(tv_apps))
        .route("/tv/launch", get(tv_launch))
        .with_state(state)
}

pub async fn spawn_server(bind: &str, state: AppState, ui_dir: &str) -> Result<()> {
    let static_svc = ServeDir::new(ui_dir).append_index_html_on_directories(true);
    let app = router(state)
        .fallback_service(static_svc)
        .layer(TraceLayer::new_for_http());

    info!("serving on http://{bind}");
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// GET /scan?subnet=&start=&end=&port=
///
/// Every expected failure (bad input, nothing found, no derivable subnet)
/// is a structured 200 response; the HTTP status stays out of it.
async fn get_scan(
    State(app): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<ScanResponse> {
    let raw_subnet = q.get("subnet").map(String::as_str);
    let fallback = netdetect::resolve_server_address(app.interfaces.as_ref()).ok();

    let outcome = plan::plan(
        raw_subnet,
        q.get("start").map(String::as_str),
        q.get("end").map(String::as_str),
        q.get("port").map(String::as_str),
        fallback,
        app.probe_timeout,
    );

    let plan = match outcome {
        Err(e) => {
            return Json(invalid_scan_response(raw_subnet.unwrap_or_default(), &e));
        }
        Ok(PlanOutcome::NeedsSubnet) => {
            return Json(scanner::needs_subnet_response(target_port(&q)));
        }
        Ok(PlanOutcome::Ready(plan)) => plan,
    };

    info!(
        subnet = %plan.subnet_prefix,
        start = plan.range_start,
        end = plan.range_end,
        port = plan.port,
        "scanning"
    );
    let outcomes = scanner::probe_all(
        &app.client,
        &plan,
        app.probe_concurrency,
        CancellationToken::new(),
    )
    .await;
    Json(scanner::aggregate(outcomes, &plan))
}

fn invalid_scan_response(raw_subnet: &str, err: &PlanError) -> ScanResponse {
    ScanResponse {
        success: false,
        devices: Vec::new(),
        meta: ScanMeta {
            subnet: raw_subnet.to_string(),
            range_start: plan::RANGE_MIN,
            range_end: plan::RANGE_MAX,
            port: plan::DEFAULT_CONTROL_PORT,
            needs_subnet: false,
        },
        error: Some(err.to_string()),
    }
}

/// GET /api/local-ip
///
/// Tells the UI which address the server scans from and whether the
/// caller should enter a subnet manually.
async fn get_local_ip(
    State(app): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<LocalIpInfo> {
    let client_ip = netdetect::classify_caller(&headers, peer);
    let client_private = netdetect::is_private(&client_ip);

    match netdetect::resolve_server_address(app.interfaces.as_ref()) {
        Ok(ip) => {
            let server_ip = ip.to_string();
            let server_private = netdetect::is_private_addr(ip);
            let (tip, suggested_subnet) = if server_private {
                (
                    "Scanning uses the server's subnet by default; change it on the scan page if \
                     the TV sits on a different network."
                        .to_string(),
                    netdetect::suggested_subnet(ip),
                )
            } else {
                (
                    "The server has no private address, so the subnet cannot be derived; enter \
                     your LAN subnet (e.g. 192.168.1) on the scan page."
                        .to_string(),
                    String::new(),
                )
            };
            Json(LocalIpInfo {
                local_ip: server_ip.clone(),
                server_ip,
                client_ip,
                server_ip_is_private: server_private,
                client_ip_is_private: client_private,
                should_prompt_manual: !server_private,
                tip,
                suggested_subnet,
            })
        }
        Err(e) => {
            warn!("failed to resolve server address: {e}");
            Json(LocalIpInfo {
                local_ip: String::new(),
                server_ip: String::new(),
                client_ip,
                server_ip_is_private: false,
                client_ip_is_private: client_private,
                should_prompt_manual: true,
                tip: "Could not determine the server address; enter your LAN subnet manually."
                    .to_string(),
                suggested_subnet: String::new(),
            })
        }
    }
}

/// GET /api/get-device-name?ip= (single-host liveness lookup).
async fn get_device_name(
    State(app): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<DeviceNameResponse> {
    let device_name = match target_host(&q) {
        Some(ip) => {
            scanner::device_name(&app.client, &ip, target_port(&q), app.relay_timeout).await
        }
        None => "unknown".to_string(),
    };
    Json(DeviceNameResponse { device_name })
}

async fn tv_key(
    State(app): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<VendorEnvelope> {
    relay_endpoint(app, q, RelayAction::KeyEvent).await
}

async fn tv_apps(
    State(app): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<VendorEnvelope> {
    relay_endpoint(app, q, RelayAction::ListApps).await
}

async fn tv_launch(
    State(app): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Json<VendorEnvelope> {
    relay_endpoint(app, q, RelayAction::LaunchApp).await
}

/// Shared body of the three relay endpoints: resolve the target, forward
/// exactly one vendor call, and flatten validation failures into the same
/// envelope shape the device would answer with.
async fn relay_endpoint(
    app: AppState,
    q: HashMap<String, String>,
    action: RelayAction,
) -> Json<VendorEnvelope> {
    let Some(ip) = target_host(&q) else {
        return Json(VendorEnvelope {
            status: 1,
            msg: "missing required parameter: ip".to_string(),
            data: None,
        });
    };

    let req = RelayRequest {
        target_host: ip,
        target_port: target_port(&q),
        action,
        params: q.into_iter().collect(),
    };
    match relay::relay(&app.client, app.relay_timeout, &req).await {
        Ok(envelope) => Json(envelope),
        Err(e) => Json(VendorEnvelope {
            status: 1,
            msg: e.to_string(),
            data: None,
        }),
    }
}

fn target_host(q: &HashMap<String, String>) -> Option<String> {
    q.get("ip")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn target_port(q: &HashMap<String, String>) -> u16 {
    q.get("port")
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .unwrap_or(plan::DEFAULT_CONTROL_PORT)
}
