mod common;

use std::time::{Duration, Instant};

use async_openai::config::OpenAIConfig;

use common::{chat_completion_response, chat_request, MockProxy, MockReply, VALID_KEY};
use prysm::headers::USER_ID_HEADER;
use prysm::{
    monitor, BlockingMonitoredClient, ConfigError, ContextStore, ContextUpdate, MonitoredClient,
    PrysmConfig,
};

fn config(base_url: &str) -> PrysmConfig {
    PrysmConfig::builder()
        .api_key(VALID_KEY)
        .base_url(base_url)
        .build()
}

fn openai_client() -> async_openai::Client<OpenAIConfig> {
    async_openai::Client::with_config(OpenAIConfig::new().with_api_key("sk-openai-original"))
}

#[test]
fn test_monitor_async_openai_client() {
    let monitored: MonitoredClient =
        monitor(&openai_client(), config("http://localhost:3000/api/v1")).unwrap();

    assert_eq!(monitored.api_key(), VALID_KEY);
    assert_eq!(monitored.base_url(), "http://localhost:3000/api/v1");
}

#[test]
fn test_monitor_reqwest_client() {
    let monitored: MonitoredClient = monitor(
        &reqwest::Client::new(),
        config("http://localhost:3000/api/v1/"),
    )
    .unwrap();

    assert_eq!(monitored.base_url(), "http://localhost:3000/api/v1");
}

#[test]
fn test_monitor_blocking_client() {
    let monitored: BlockingMonitoredClient = monitor(
        &reqwest::blocking::Client::new(),
        config("http://localhost:3000/api/v1"),
    )
    .unwrap();

    assert_eq!(monitored.api_key(), VALID_KEY);
    assert_eq!(monitored.base_url(), "http://localhost:3000/api/v1");
}

#[test]
fn test_monitor_rebinds_monitored_client() {
    let first: MonitoredClient = monitor(&openai_client(), config("http://first.local/v1")).unwrap();
    let second = monitor(&first, config("http://second.local/v1")).unwrap();

    assert_eq!(first.base_url(), "http://first.local/v1");
    assert_eq!(second.base_url(), "http://second.local/v1");
}

#[test]
fn test_monitor_rejects_invalid_key() {
    let err = monitor(
        &openai_client(),
        PrysmConfig::builder()
            .api_key("sk-openai-bad")
            .base_url("http://localhost:3000/api/v1")
            .build(),
    )
    .unwrap_err();

    assert!(matches!(err, ConfigError::InvalidApiKeyFormat { .. }));
}

#[test]
fn test_monitor_rejects_invalid_base_url() {
    let err = monitor(&reqwest::Client::new(), config("localhost")).unwrap_err();

    assert!(matches!(err, ConfigError::InvalidBaseUrl(_)));
}

#[tokio::test]
async fn test_monitored_call_waits_for_response() {
    ContextStore::clear();
    let delay = Duration::from_millis(200);
    let proxy =
        MockProxy::start(MockReply::json(200, chat_completion_response()).delayed(delay));
    let client = monitor(&openai_client(), config(&proxy.base_url)).unwrap();

    let started = Instant::now();
    let response = ContextStore::scope(
        ContextUpdate::new().user_id("patient_user"),
        client.chat_completion(chat_request("Hi")),
    )
    .await
    .unwrap();

    assert!(started.elapsed() >= delay);
    assert_eq!(response.id, "chatcmpl-test123");
    assert_eq!(
        proxy.last_request().header(USER_ID_HEADER),
        Some("patient_user")
    );
}

#[test]
fn test_blocking_monitored_call_goes_through_proxy() {
    ContextStore::clear();
    let proxy = MockProxy::start(MockReply::json(200, chat_completion_response()));
    let client = monitor(&reqwest::blocking::Client::new(), config(&proxy.base_url)).unwrap();

    let _guard = ContextStore::scoped(ContextUpdate::new().user_id("sync_user"));
    let response = client.chat_completion(chat_request("Hi")).unwrap();

    assert_eq!(
        response.choices[0].message.content.as_deref(),
        Some("Hello! How can I help you today?")
    );
    assert_eq!(
        proxy.last_request().header(USER_ID_HEADER),
        Some("sync_user")
    );
}
