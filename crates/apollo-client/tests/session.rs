//! End-to-end retrieval and change-watch behaviour against a mock config service.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use apollo_client::signer::{HEADER_AUTHORIZATION, HEADER_TIMESTAMP};
use apollo_client::{
    ClientError, ClientResult, ClientSession, ConfigFetch, ConfigurationSet, RequestOutcome,
    SessionConfig, Transport, TransportRequest, WatchSet,
};
use async_trait::async_trait;
use httpmock::prelude::*;
use tokio::net::TcpListener;

const RELEASE_BODY: &str = r#"{"appId":"app1","cluster":"default","namespaceName":"application","configurations":{"k":"v"},"releaseKey":"r1"}"#;

fn config_for(server: &MockServer) -> SessionConfig {
    SessionConfig::new(server.base_url(), "app1").with_report_client_ip(false)
}

#[derive(Default)]
struct RecordingTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn get(&self, request: &TransportRequest) -> ClientResult<RequestOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ClientError::UnexpectedStatus {
            url: request.url.clone(),
            status: 599,
        })
    }
}

#[tokio::test]
async fn retrieval_returns_release_then_unchanged() -> Result<()> {
    let server = MockServer::start_async().await;
    let mut release = server.mock(|when, then| {
        when.method(GET).path("/configs/app1/default/application");
        then.status(200)
            .header("content-type", "application/json")
            .body(RELEASE_BODY);
    });

    let session = ClientSession::connect(config_for(&server)).await?;
    let fetched = session.configs("application").fetch().await?;
    release.assert();
    release.delete();

    let expected = ConfigurationSet {
        app_id: "app1".into(),
        cluster: "default".into(),
        namespace_name: "application".into(),
        configurations: HashMap::from([("k".to_string(), "v".to_string())]),
        release_key: Some("r1".into()),
    };
    assert_eq!(fetched, ConfigFetch::Changed(expected));

    let unchanged = server.mock(|when, then| {
        when.method(GET)
            .path("/configs/app1/default/application")
            .query_param("releaseKey", "r1");
        then.status(304);
    });
    let second = session
        .configs("application")
        .release_key("r1")
        .fetch()
        .await?;
    unchanged.assert();
    assert!(second.is_unchanged());
    Ok(())
}

#[tokio::test]
async fn cached_retrieval_reports_ip_and_wraps_flat_map() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/configfiles/json/app1/default/application")
            .query_param("ip", "10.4.123.251");
        then.status(200).body(r#"{"timeout":"100","enabled":"true"}"#);
    });

    let session = ClientSession::connect(
        SessionConfig::new(server.base_url(), "app1")
            .with_client_ip(IpAddr::from([10, 4, 123, 251])),
    )
    .await?;
    let set = session
        .configs("application")
        .cached()
        .fetch()
        .await?
        .into_configuration()
        .ok_or_else(|| anyhow!("cached endpoint reported unchanged"))?;

    mock.assert();
    assert_eq!(set.namespace_name, "application");
    assert_eq!(set.release_key, None);
    assert_eq!(set.configurations.get("timeout").map(String::as_str), Some("100"));
    Ok(())
}

#[tokio::test]
async fn unexpected_status_carries_url_and_code() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/configs/app1/default/missing");
        then.status(404).body("namespace not found");
    });

    let session = ClientSession::connect(config_for(&server)).await?;
    match session.configs("missing").fetch().await {
        Err(err @ ClientError::UnexpectedStatus { status: 404, .. }) => {
            assert_eq!(
                err.to_string(),
                format!(
                    "{} returns HTTP status code: 404",
                    server.url("/configs/app1/default/missing")
                )
            );
        }
        other => return Err(anyhow!("unexpected result: {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn signed_session_sends_auth_headers_on_every_endpoint() -> Result<()> {
    let server = MockServer::start_async().await;
    let configs = server.mock(|when, then| {
        when.method(GET)
            .path("/configs/app1/default/application")
            .header_exists(HEADER_AUTHORIZATION)
            .header_exists(HEADER_TIMESTAMP);
        then.status(200).body(RELEASE_BODY);
    });
    let notifications = server.mock(|when, then| {
        when.method(GET)
            .path("/notifications/v2")
            .header_exists(HEADER_AUTHORIZATION)
            .header_exists(HEADER_TIMESTAMP);
        then.status(200).body("[]");
    });

    let session = ClientSession::connect(config_for(&server).with_secret("s3cret")).await?;
    session.configs("application").fetch().await?;
    let updates = session.watch(&WatchSet::unobserved(["application"])).await?;

    configs.assert();
    notifications.assert();
    assert!(updates.is_empty());
    Ok(())
}

#[tokio::test]
async fn watch_reports_new_versions_and_messages_feed_retrieval() -> Result<()> {
    let server = MockServer::start_async().await;
    let notifications = server.mock(|when, then| {
        when.method(GET)
            .path("/notifications/v2")
            .query_param("appId", "app1")
            .query_param("cluster", "default")
            .query_param(
                "notifications",
                r#"[{"namespaceName":"application","notificationId":-1},{"namespaceName":"feature","notificationId":7}]"#,
            );
        then.status(200).body(
            r#"[{"namespaceName":"application","notificationId":12,"messages":{"details":{"app1+default+application":12}}}]"#,
        );
    });
    let configs = server.mock(|when, then| {
        when.method(GET)
            .path("/configs/app1/default/application")
            .query_param("messages", r#"{"details":{"app1+default+application":12}}"#);
        then.status(200).body(RELEASE_BODY);
    });

    let session = ClientSession::connect(config_for(&server)).await?;
    let mut watched = WatchSet::unobserved(["application"]);
    watched.insert("feature", 7);

    let reported = session.poll_notifications(&watched).await?;
    assert_eq!(reported.len(), 1);
    let messages = reported[0]
        .messages
        .clone()
        .ok_or_else(|| anyhow!("notification carried no messages"))?;

    let updates: WatchSet = reported
        .iter()
        .map(|notification| (notification.namespace_name.clone(), notification.notification_id))
        .collect();
    watched.merge(&updates);
    assert_eq!(watched.get("application"), Some(12));
    assert_eq!(watched.get("feature"), Some(7));

    let fetched = session
        .configs("application")
        .notification_messages(&messages)?
        .fetch()
        .await?;
    notifications.assert();
    configs.assert();
    assert!(!fetched.is_unchanged());
    Ok(())
}

#[tokio::test]
async fn rejected_notification_surfaces_body() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/notifications/v2");
        then.status(400).body("invalid notifications format");
    });

    let session = ClientSession::connect(config_for(&server)).await?;
    let err = session
        .watch(&WatchSet::unobserved(["application"]))
        .await
        .err()
        .ok_or_else(|| anyhow!("watch unexpectedly succeeded"))?;
    assert_eq!(err.status(), Some(400));
    assert_eq!(err.to_string(), "invalid notifications format");
    Ok(())
}

#[tokio::test]
async fn watch_is_bounded_by_notification_timeout() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(GET).path("/notifications/v2");
        then.status(200).body("[]").delay(Duration::from_secs(5));
    });

    let session = ClientSession::connect(
        config_for(&server).with_notification_timeout(Duration::from_millis(200)),
    )
    .await?;
    let started = Instant::now();
    let result = session.watch(&WatchSet::unobserved(["application"])).await;
    assert!(matches!(&result, Err(err) if err.is_transport()));
    assert!(started.elapsed() < Duration::from_secs(4));
    Ok(())
}

#[tokio::test]
async fn invalid_calls_never_reach_the_transport() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let transport = Arc::new(RecordingTransport::default());

    let session = ClientSession::connect_with_transport(
        SessionConfig::new(format!("http://127.0.0.1:{port}"), "app1")
            .with_report_client_ip(false),
        transport.clone(),
    )
    .await?;

    assert!(matches!(
        session.configs("").fetch().await,
        Err(ClientError::MissingNamespace)
    ));
    assert!(matches!(
        session.watch(&WatchSet::new()).await,
        Err(ClientError::EmptyWatchSet)
    ));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);

    let _ = session.configs("application").fetch().await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn unreachable_server_aborts_construction() -> Result<()> {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    match ClientSession::connect(SessionConfig::new(format!("http://127.0.0.1:{port}"), "app1")).await {
        Err(ClientError::PortUnreachable { host, port: probed }) => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(probed, port);
        }
        other => return Err(anyhow!("unexpected result: {other:?}")),
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_callers_share_one_session() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(GET).path("/configs/app1/default/application");
        then.status(200).body(RELEASE_BODY);
    });

    let session = Arc::new(ClientSession::connect(config_for(&server)).await?);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session.configs("application").fetch().await
        }));
    }
    for handle in handles {
        assert!(!handle.await??.is_unchanged());
    }
    mock.assert_hits(8);
    Ok(())
}
