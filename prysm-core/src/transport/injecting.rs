use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::{BlockingTransport, Transport};
use crate::context::ContextStore;
use crate::headers::{self, InjectedHeaders};

/// Decorates a transport so that every request it sends carries the caller's
/// current [`RequestContext`](crate::context::RequestContext) plus the
/// configured static headers.
///
/// Errors from the wrapped transport are returned untouched and nothing is
/// retried.
#[derive(Debug, Clone)]
pub struct InjectingTransport<T> {
    inner: T,
    injected: InjectedHeaders,
}

impl<T> InjectingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_headers(inner, InjectedHeaders::default())
    }

    pub fn with_headers(inner: T, injected: InjectedHeaders) -> Self {
        Self { inner, injected }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn injected(&self) -> &InjectedHeaders {
        &self.injected
    }

    /// Writes the Prysm headers for the current context into `headers`.
    pub fn prepare(&self, headers: &mut HeaderMap) {
        let context = ContextStore::snapshot();
        headers::inject(&context, &self.injected, headers);
    }
}

#[async_trait]
impl<T> Transport for InjectingTransport<T>
where
    T: Transport,
{
    async fn execute(&self, mut request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.prepare(request.headers_mut());
        self.inner.execute(request).await
    }
}

impl<T> BlockingTransport for InjectingTransport<T>
where
    T: BlockingTransport,
{
    fn execute(
        &self,
        mut request: reqwest::blocking::Request,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        self.prepare(request.headers_mut());
        self.inner.execute(request)
    }
}
