//! The request-sending primitives the SDK sits on, and the layer that
//! injects Prysm headers before delegating to them.

mod injecting;

use std::sync::Arc;

use async_trait::async_trait;

pub use injecting::InjectingTransport;

/// Sends a request and resolves to the response, suspending the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response>;
}

/// Sends a request and returns the response, blocking the caller.
pub trait BlockingTransport: Send + Sync {
    fn execute(
        &self,
        request: reqwest::blocking::Request,
    ) -> reqwest::Result<reqwest::blocking::Response>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        reqwest::Client::execute(self, request).await
    }
}

impl BlockingTransport for reqwest::blocking::Client {
    fn execute(
        &self,
        request: reqwest::blocking::Request,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        reqwest::blocking::Client::execute(self, request)
    }
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        (**self).execute(request).await
    }
}

impl<T> BlockingTransport for Arc<T>
where
    T: BlockingTransport + ?Sized,
{
    fn execute(
        &self,
        request: reqwest::blocking::Request,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        (**self).execute(request)
    }
}
