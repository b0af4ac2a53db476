use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fixloop_types::FixloopError;

use crate::{DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            tool_calls = response.tool_calls.len(),
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: UsageTracker
// ---------------------------------------------------------------------------

/// Accumulates token usage across every call made through the client.
///
/// Clones share the same counters, so keep one clone to read totals after
/// handing the other to [`LlmClient::with_middleware`].
#[derive(Clone, Default)]
pub struct UsageTracker {
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
    calls: Arc<AtomicU64>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Middleware for UsageTracker {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    default_provider: Option<String>,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
            middleware: Vec::new(),
        }
    }

    /// Register a provider. The first registered provider becomes the default.
    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(name.clone());
        }
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, FixloopError> {
        let provider = self.resolve_provider(request)?;
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, FixloopError> {
        if let Some(ref provider_name) = request.provider {
            return self.providers.get(provider_name).ok_or_else(|| {
                FixloopError::Other(format!("Provider '{}' not registered", provider_name))
            });
        }

        self.default_provider
            .as_ref()
            .and_then(|name| self.providers.get(name))
            .ok_or_else(|| FixloopError::Other("No providers registered".to_string()))
    }

    /// Create from environment variables (detect available API keys).
    pub fn from_env() -> Result<Self, FixloopError> {
        let mut client = Self::new();
        client.register_provider(crate::OpenAiAdapter::from_env()?);
        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, Usage};
    use async_trait::async_trait;

    struct FixedProvider {
        name: &'static str,
    }

    #[async_trait]
    impl ProviderAdapter for FixedProvider {
        async fn complete(&self, _request: &Request) -> Result<Response, FixloopError> {
            let mut resp = Response::text(format!("from {}", self.name));
            resp.usage = Usage {
                input_tokens: 10,
                output_tokens: 20,
                total_tokens: 30,
            };
            Ok(resp)
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "fixed"
        }
    }

    struct TagMiddleware;

    impl Middleware for TagMiddleware {
        fn after(&self, _request: &Request, response: &mut Response) {
            response.text.push_str(" [tagged]");
        }
    }

    fn request() -> Request {
        Request::new("fixed", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn routes_to_first_registered_provider() {
        let mut client = LlmClient::new();
        client.register_provider(FixedProvider { name: "alpha" });
        client.register_provider(FixedProvider { name: "beta" });

        let resp = client.complete(&request()).await.unwrap();
        assert_eq!(resp.text, "from alpha");
    }

    #[tokio::test]
    async fn explicit_provider_wins() {
        let mut client = LlmClient::new();
        client.register_provider(FixedProvider { name: "alpha" });
        client.register_provider(FixedProvider { name: "beta" });

        let mut req = request();
        req.provider = Some("beta".into());
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.text, "from beta");

        req.provider = Some("gamma".into());
        assert!(client.complete(&req).await.is_err());
    }

    #[tokio::test]
    async fn no_providers_is_an_error() {
        let client = LlmClient::new();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("No providers registered"));
    }

    #[tokio::test]
    async fn middleware_runs_and_usage_accumulates() {
        let tracker = UsageTracker::new();
        let mut client = LlmClient::new()
            .with_middleware(TagMiddleware)
            .with_middleware(tracker.clone());
        client.register_provider(FixedProvider { name: "alpha" });

        let resp = client.complete(&request()).await.unwrap();
        client.complete(&request()).await.unwrap();

        assert_eq!(resp.text, "from alpha [tagged]");
        assert_eq!(tracker.calls(), 2);
        assert_eq!(tracker.total_input_tokens(), 20);
        assert_eq!(tracker.total_output_tokens(), 40);
    }
}
