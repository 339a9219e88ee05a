//! End-to-end tests against the mock server over real HTTP.
//!
//! # Design
//! Starts the mock server on a random port, points a `KraftCloud` bundle at
//! it through the `base_url` option, and exercises the resource clients
//! through the default reqwest transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use kraftcloud_core::services::instances::{CreateInstanceRequest, InstanceState, StopOptions};
use kraftcloud_core::{Error, KraftCloud, Options, ReqwestTransport, ResponseStatus, ServiceClient};
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "integration-token";

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { mock_server::run(listener, TOKEN).await });
    addr
}

fn kraftcloud(addr: SocketAddr, token: &str) -> KraftCloud {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let options = Options::builder()
        .token(token)
        .base_url(format!("http://{addr}/v1"))
        .transport(Arc::new(ReqwestTransport::with_client(client)))
        .build_with_env(|_| None)
        .unwrap();
    KraftCloud::new(options)
}

#[tokio::test]
async fn instance_lifecycle() {
    let addr = start_server().await;
    let kc = kraftcloud(addr, TOKEN);
    let cancel = CancellationToken::new();
    let instances = kc.instances();

    // Step 1: list, should be empty.
    let listed = instances.list(&cancel).await.unwrap();
    assert_eq!(listed.status, ResponseStatus::Success);
    assert!(listed.is_empty());

    // Step 2: create.
    let mut req = CreateInstanceRequest::new("nginx:latest");
    req.name = Some("web".to_string());
    req.memory_mb = Some(256);
    let created = instances.create(&cancel, &req).await.unwrap();
    assert_eq!(created.name, "web");
    assert_eq!(created.memory_mb, Some(256));
    assert_eq!(created.state, Some(InstanceState::Running));
    assert_eq!(created.fqdn.as_deref(), Some("web.mock.kraft.host"));

    // Step 3: get by uuid and by name.
    let (found, result) = instances
        .get(&cancel, [created.uuid.as_str(), "web"])
        .await
        .unwrap()
        .all_or_err();
    result.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|i| i.uuid == created.uuid));

    // Step 4: stop, then start again.
    let (stopped, result) = instances
        .stop(&cancel, ["web"], StopOptions::default())
        .await
        .unwrap()
        .all_or_err();
    result.unwrap();
    assert_eq!(stopped[0].state, Some(InstanceState::Stopped));

    let (started, result) = instances
        .start(&cancel, [created.uuid.clone()], None)
        .await
        .unwrap()
        .all_or_err();
    result.unwrap();
    assert_eq!(started[0].state, Some(InstanceState::Running));

    // Step 5: quotas reflect the running instance.
    let quotas = kc.users().quotas(&cancel).await.unwrap();
    assert_eq!(quotas.used.instances, 1);
    assert_eq!(quotas.used.live_memory_mb, 256);

    // Step 6: delete the instance and a missing one; partial success keeps both items.
    let (deleted, result) = instances
        .delete(&cancel, [created.uuid.as_str(), "ghost"])
        .await
        .unwrap()
        .all_or_err();
    assert_eq!(deleted.len(), 2);
    assert_eq!(deleted[0].uuid, created.uuid);
    let err = result.unwrap_err();
    let causes: Vec<String> = err.causes().iter().map(|e| e.to_string()).collect();
    assert!(causes.contains(&"instance not found (code=6)".to_string()), "{causes:?}");

    // Step 7: getting the deleted instance reports the envelope error.
    let (missing, result) = instances
        .get_by_uuids(&cancel, [created.uuid.as_str()])
        .await
        .unwrap()
        .first_or_err();
    assert!(missing.is_some_and(|i| i.common.error == Some(6)));
    assert_eq!(result.unwrap_err().to_string(), "Failed to perform all operations");
}

#[tokio::test]
async fn duplicate_names_fail_create() {
    let addr = start_server().await;
    let kc = kraftcloud(addr, TOKEN);
    let cancel = CancellationToken::new();

    let mut req = CreateInstanceRequest::new("app:1");
    req.name = Some("dup".to_string());
    kc.instances().create(&cancel, &req).await.unwrap();

    let err = kc.instances().create(&cancel, &req).await.unwrap_err();
    let codes: Vec<_> = err.causes().iter().filter_map(|e| e.api_code()).collect();
    assert_eq!(codes, [kraftcloud_core::ApiErrorCode::AlreadyExists]);
}

#[tokio::test]
async fn volume_lifecycle() {
    let addr = start_server().await;
    let kc = kraftcloud(addr, TOKEN);
    let cancel = CancellationToken::new();
    let volumes = kc.volumes();

    let created = volumes.create(&cancel, "data", 64).await.unwrap();
    assert_eq!(created.name, "data");
    assert_eq!(created.size_mb, Some(64));

    let (listed, result) = volumes.list(&cancel).await.unwrap().all_or_err();
    result.unwrap();
    assert_eq!(listed.len(), 1);

    let (deleted, result) = volumes.delete(&cancel, ["data"]).await.unwrap().all_or_err();
    result.unwrap();
    assert_eq!(deleted[0].uuid, created.uuid);
}

#[tokio::test]
async fn zero_sized_volume_never_reaches_the_server() {
    // Nothing listens on this address; validation must fail first.
    let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let kc = kraftcloud(addr, TOKEN);
    let err = kc
        .volumes()
        .create(&CancellationToken::new(), "data", 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn bad_token_is_http_error() {
    let addr = start_server().await;
    let kc = kraftcloud(addr, "wrong");
    let err = kc
        .instances()
        .list(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Http { status: 401, .. }));
    assert_eq!(
        err.to_string(),
        "API error: status code 401, message: Unauthorized"
    );
}

#[tokio::test]
async fn unreachable_metro_is_offline() {
    let addr = start_server().await;
    let kc = kraftcloud(addr, TOKEN);
    let cancel = CancellationToken::new();

    let status = kc.metros().status(&cancel, "fra0").await.unwrap();
    assert!(status.online);

    // Point the template at a closed port so every metro is unreachable.
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let options = Options::builder()
        .token(TOKEN)
        .base_url("http://127.0.0.1:9/{metro}/v1")
        .transport(Arc::new(ReqwestTransport::with_client(client)))
        .build_with_env(|_| None)
        .unwrap();
    let offline = KraftCloud::new(options)
        .metros()
        .with_metro("dal0")
        .status(&cancel, "sin0")
        .await
        .unwrap();
    assert_eq!(offline.code, "sin0");
    assert!(!offline.online);
}
