use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::{routing::get, Json, Router};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tv_remote_rs::netdetect::InterfaceSource;
use tv_remote_rs::server::{router, AppState};
use tv_remote_rs::types::{DeviceNameResponse, LocalIpInfo, ScanResponse, VendorEnvelope};

struct Fixed(Vec<Ipv4Addr>);

impl InterfaceSource for Fixed {
    fn ipv4_addresses(&self) -> std::io::Result<Vec<Ipv4Addr>> {
        Ok(self.0.clone())
    }
}

fn state(addrs: Vec<Ipv4Addr>) -> AppState {
    AppState {
        client: reqwest::Client::builder().no_proxy().build().unwrap(),
        interfaces: Arc::new(Fixed(addrs)),
        probe_concurrency: 254,
        probe_timeout: Duration::from_millis(500),
        relay_timeout: Duration::from_millis(500),
    }
}

async fn get_json<T: DeserializeOwned>(state: AppState, uri: &str) -> T {
    let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    req.extensions_mut().insert(ConnectInfo(SocketAddr::from((
        [192, 168, 1, 50],
        52_000,
    ))));
    let res = router(state).oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn scan_without_subnet_on_public_server_prompts_for_subnet() {
    let res: ScanResponse = get_json(state(vec![Ipv4Addr::new(203, 0, 113, 9)]), "/scan").await;
    assert!(!res.success);
    assert!(res.devices.is_empty());
    assert!(res.meta.needs_subnet);
    assert!(res.error.as_deref().unwrap_or_default().contains("subnet"));
}

#[tokio::test]
async fn scan_with_invalid_subnet_is_a_structured_failure() {
    let res: ScanResponse = get_json(
        state(vec![Ipv4Addr::new(192, 168, 1, 5)]),
        "/scan?subnet=999.1.1",
    )
    .await;
    assert!(!res.success);
    assert!(!res.meta.needs_subnet);
    assert!(res
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("invalid subnet"));
}

#[tokio::test]
async fn scan_end_to_end_discovers_a_stub_device() {
    // One synthetic device at 127.0.0.9; the rest of 1-20 refuses.
    let app = Router::new().route(
        "/request",
        get(|| async {
            Json(json!({ "status": 0, "msg": "success", "data": { "devicename": "Den TV" } }))
        }),
    );
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::new(127, 0, 0, 9), 0))
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let uri = format!("/scan?subnet=127.0.0&start=1&end=20&port={port}");
    let res: ScanResponse = get_json(state(vec![Ipv4Addr::new(192, 168, 1, 5)]), &uri).await;
    assert!(res.success, "unexpected failure: {:?}", res.error);
    assert_eq!(res.devices.len(), 1);
    assert_eq!(res.devices[0].host, "127.0.0.9");
    assert_eq!(res.devices[0].ip, "127.0.0.9");
    assert_eq!(res.devices[0].devicename, "Den TV");
    assert_eq!(res.devices[0].port, port);
    assert_eq!(res.meta.subnet, "127.0.0.");
}

#[tokio::test]
async fn local_ip_reports_private_server_and_suggested_subnet() {
    let info: LocalIpInfo =
        get_json(state(vec![Ipv4Addr::new(192, 168, 1, 5)]), "/api/local-ip").await;
    assert_eq!(info.server_ip, "192.168.1.5");
    assert_eq!(info.local_ip, info.server_ip);
    assert_eq!(info.client_ip, "192.168.1.50");
    assert!(info.server_ip_is_private);
    assert!(info.client_ip_is_private);
    assert!(!info.should_prompt_manual);
    assert_eq!(info.suggested_subnet, "192.168.1.");
    assert!(!info.tip.is_empty());
}

#[tokio::test]
async fn local_ip_on_public_server_prompts_manual_entry() {
    let info: LocalIpInfo =
        get_json(state(vec![Ipv4Addr::new(203, 0, 113, 9)]), "/api/local-ip").await;
    assert!(!info.server_ip_is_private);
    assert!(info.should_prompt_manual);
    assert_eq!(info.suggested_subnet, "");
}

#[tokio::test]
async fn tv_key_without_ip_is_rejected_in_envelope_shape() {
    let env: VendorEnvelope = get_json(
        state(vec![Ipv4Addr::new(192, 168, 1, 5)]),
        "/tv/key?keycode=home",
    )
    .await;
    assert_eq!(env.status, 1);
    assert!(env.msg.contains("ip"));
    assert_eq!(env.data, None);
}

#[tokio::test]
async fn tv_key_without_keycode_is_rejected_in_envelope_shape() {
    let env: VendorEnvelope = get_json(
        state(vec![Ipv4Addr::new(192, 168, 1, 5)]),
        "/tv/key?ip=127.0.0.1",
    )
    .await;
    assert_eq!(env.status, 1);
    assert!(env.msg.contains("keycode"));
}

#[tokio::test]
async fn get_device_name_without_ip_is_unknown() {
    let res: DeviceNameResponse = get_json(
        state(vec![Ipv4Addr::new(192, 168, 1, 5)]),
        "/api/get-device-name",
    )
    .await;
    assert_eq!(res.device_name, "unknown");
}
