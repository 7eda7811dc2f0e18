use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use mockall::mock;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Request, Response, Url};
use serde_json::{json, Value};

use prysm_core::headers::{
    FORWARD_HEADERS_HEADER, METADATA_HEADER, SESSION_ID_HEADER, UPSTREAM_KEY_HEADER,
    USER_ID_HEADER,
};
use prysm_core::{ContextStore, ContextUpdate, InjectedHeaders, InjectingTransport, Transport};

// Mock upstream for testing
mock! {
    pub Upstream {}
    #[async_trait::async_trait]
    impl Transport for Upstream {
        async fn execute(&self, request: Request) -> reqwest::Result<Response>;
    }
}

fn request() -> Request {
    let url = Url::parse("http://mock-prysm.local/v1/chat/completions").unwrap();
    let mut request = Request::new(Method::POST, url);
    request
        .headers_mut()
        .insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-prysm-test"));
    request
}

fn capturing_upstream(captured: Arc<Mutex<Vec<HeaderMap>>>) -> MockUpstream {
    let mut upstream = MockUpstream::new();
    upstream.expect_execute().returning(move |request| {
        captured.lock().unwrap().push(request.headers().clone());
        Ok(Response::from(http::Response::new("{}")))
    });
    upstream
}

#[tokio::test]
async fn test_context_headers_injected() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let transport = InjectingTransport::new(capturing_upstream(captured.clone()));

    ContextStore::set(
        ContextUpdate::new()
            .user_id("user_42")
            .session_id("sess_abc")
            .metadata_entry("env", "test"),
    );

    let response = transport.execute(request()).await.unwrap();
    assert_eq!(response.status(), 200);

    let headers = captured.lock().unwrap().remove(0);
    assert_eq!(headers.get(USER_ID_HEADER).unwrap(), "user_42");
    assert_eq!(headers.get(SESSION_ID_HEADER).unwrap(), "sess_abc");
    let metadata: Value =
        serde_json::from_str(headers.get(METADATA_HEADER).unwrap().to_str().unwrap()).unwrap();
    assert_eq!(metadata, json!({"env": "test"}));
    assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-prysm-test");
}

#[tokio::test]
async fn test_no_context_no_headers() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let transport = InjectingTransport::new(capturing_upstream(captured.clone()));

    ContextStore::clear();
    transport.execute(request()).await.unwrap();

    let headers = captured.lock().unwrap().remove(0);
    assert_eq!(headers.len(), 1);
    assert!(headers.keys().all(|name| !name.as_str().starts_with("x-prysm-")));
}

#[tokio::test]
async fn test_static_headers_injected() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut forward = BTreeMap::new();
    forward.insert("X-Gitlab-Instance-Id".to_string(), "gitlab.example.com".to_string());
    forward.insert("X-Gitlab-Realm".to_string(), "saas".to_string());

    let transport = InjectingTransport::with_headers(
        capturing_upstream(captured.clone()),
        InjectedHeaders::new()
            .with_upstream_api_key("glpat-upstream")
            .with_forward_headers(forward.clone()),
    );

    transport.execute(request()).await.unwrap();

    let headers = captured.lock().unwrap().remove(0);
    assert_eq!(headers.get(UPSTREAM_KEY_HEADER).unwrap(), "glpat-upstream");
    let forwarded: BTreeMap<String, String> =
        serde_json::from_str(headers.get(FORWARD_HEADERS_HEADER).unwrap().to_str().unwrap())
            .unwrap();
    assert_eq!(forwarded, forward);
    // upstream key never replaces the proxy credential
    assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer sk-prysm-test");
}

#[tokio::test]
async fn test_injected_headers_overwrite_existing() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let transport = InjectingTransport::new(capturing_upstream(captured.clone()));

    let mut req = request();
    req.headers_mut()
        .insert(USER_ID_HEADER, HeaderValue::from_static("stale"));

    let _guard = ContextStore::scoped(ContextUpdate::new().user_id("fresh"));
    transport.execute(req).await.unwrap();

    let headers = captured.lock().unwrap().remove(0);
    assert_eq!(headers.get_all(USER_ID_HEADER).iter().count(), 1);
    assert_eq!(headers.get(USER_ID_HEADER).unwrap(), "fresh");
}

#[tokio::test]
async fn test_scoped_context_per_request() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let transport = InjectingTransport::new(capturing_upstream(captured.clone()));

    ContextStore::set(ContextUpdate::new().user_id("global_user"));
    transport.execute(request()).await.unwrap();

    ContextStore::scope(ContextUpdate::new().user_id("scoped_user"), async {
        transport.execute(request()).await.unwrap();
    })
    .await;

    transport.execute(request()).await.unwrap();

    let users: Vec<_> = captured
        .lock()
        .unwrap()
        .iter()
        .map(|headers| headers.get(USER_ID_HEADER).unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(users, vec!["global_user", "scoped_user", "global_user"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_cross_talk() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let transport = Arc::new(InjectingTransport::new(capturing_upstream(captured.clone())));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let transport = transport.clone();
            ContextStore::spawn(async move {
                ContextStore::set(ContextUpdate::new().user_id(format!("user_{i}")));
                tokio::task::yield_now().await;
                let mut req = request();
                req.headers_mut()
                    .insert("x-test-task", HeaderValue::from(i as u64));
                transport.execute(req).await.unwrap();
            })
        })
        .collect();
    futures::future::join_all(tasks).await;

    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 8);
    for headers in captured.iter() {
        let task = headers.get("x-test-task").unwrap().to_str().unwrap();
        assert_eq!(
            headers.get(USER_ID_HEADER).unwrap().to_str().unwrap(),
            format!("user_{task}")
        );
    }
}

#[test]
fn test_blocking_prepare_uses_thread_context() {
    let transport = InjectingTransport::with_headers(
        reqwest::blocking::Client::new(),
        InjectedHeaders::new().with_upstream_api_key("sk-upstream"),
    );
    let url = Url::parse("http://mock-prysm.local/v1/models").unwrap();
    let mut req = reqwest::blocking::Request::new(Method::GET, url);

    ContextStore::set(ContextUpdate::new().session_id("blocking_sess"));
    transport.prepare(req.headers_mut());

    assert_eq!(req.headers().get(SESSION_ID_HEADER).unwrap(), "blocking_sess");
    assert_eq!(req.headers().get(UPSTREAM_KEY_HEADER).unwrap(), "sk-upstream");
}
