use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use groupchat_core::{
    ChatMessage, CompletionRequest, LLMError, LLMFeature, LLMProvider, LLMResponse, TokenUsage,
    ToolCall,
};

/// Scriptable completion provider for tests.
///
/// Clones share state, so a test can hand one clone to the engine and keep
/// another to inspect what the engine sent.
#[derive(Clone)]
pub struct MockLLMProvider {
    inner: Arc<RwLock<MockLLMProviderInner>>,
}

struct MockLLMProviderInner {
    name: String,
    responses: Vec<LLMResponse>,
    response_index: usize,
    cycle_responses: bool,
    call_history: Vec<MockCall>,
    should_error: bool,
    error_on_call: Option<usize>,
    error_message: String,
    latency_ms: u64,
    features: Vec<LLMFeature>,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub messages: Vec<ChatMessage>,
    pub request: CompletionRequest,
    pub timestamp: std::time::Instant,
}

impl MockLLMProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLLMProviderInner {
                name: name.into(),
                responses: Vec::new(),
                response_index: 0,
                cycle_responses: false,
                call_history: Vec::new(),
                should_error: false,
                error_on_call: None,
                error_message: "Mock error".to_string(),
                latency_ms: 0,
                features: vec![LLMFeature::SystemMessages, LLMFeature::FunctionCalling],
            })),
        }
    }

    pub fn add_response(&mut self, response: LLMResponse) {
        self.inner.write().responses.push(response);
    }

    /// Queues a response requesting a single tool invocation.
    pub fn add_tool_call(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) {
        self.add_response(LLMResponse::with_tool_calls(vec![ToolCall::new(
            id, name, arguments,
        )]));
    }

    pub fn set_feature_support(&mut self, feature: LLMFeature, supported: bool) {
        let mut inner = self.inner.write();
        if supported {
            if !inner.features.contains(&feature) {
                inner.features.push(feature);
            }
        } else {
            inner.features.retain(|f| f != &feature);
        }
    }

    pub fn set_response(&mut self, response: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.responses = vec![LLMResponse::text(response)];
        inner.response_index = 0;
    }

    pub fn set_responses(&mut self, responses: Vec<String>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses.into_iter().map(LLMResponse::text).collect();
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    pub fn set_error(&mut self, error_message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.should_error = true;
        inner.error_message = error_message.into();
    }

    /// Fails only the call with the given zero-based index.
    pub fn set_error_on_call(&mut self, call_index: usize, error_message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.error_on_call = Some(call_index);
        inner.error_message = error_message.into();
    }

    pub fn clear_error(&mut self) {
        let mut inner = self.inner.write();
        inner.should_error = false;
        inner.error_on_call = None;
    }

    pub fn set_latency(&mut self, latency_ms: u64) {
        self.inner.write().latency_ms = latency_ms;
    }

    pub fn name(&self) -> String {
        self.inner.read().name.clone()
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().call_history.len()
    }

    pub fn call_history(&self) -> Vec<MockCall> {
        self.inner.read().call_history.clone()
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.inner.read().call_history.last().cloned()
    }

    pub fn clear_history(&mut self) {
        self.inner.write().call_history.clear();
    }

    pub fn reset(&mut self) {
        let mut inner = self.inner.write();
        inner.responses.clear();
        inner.response_index = 0;
        inner.cycle_responses = false;
        inner.call_history.clear();
        inner.should_error = false;
        inner.error_on_call = None;
        inner.error_message = "Mock error".to_string();
        inner.latency_ms = 0;
    }

    fn get_next_response(&self) -> LLMResponse {
        let mut inner = self.inner.write();

        if inner.responses.is_empty() {
            return LLMResponse::text("Mock response").with_model("mock-model");
        }

        let response = inner.responses[inner.response_index].clone();
        if inner.cycle_responses {
            inner.response_index = (inner.response_index + 1) % inner.responses.len();
        } else if inner.response_index < inner.responses.len() - 1 {
            inner.response_index += 1;
        }
        response
    }

    /// Records the call and returns its zero-based index.
    fn record_call(&self, messages: &[ChatMessage], request: &CompletionRequest) -> usize {
        let mut inner = self.inner.write();
        inner.call_history.push(MockCall {
            messages: messages.to_vec(),
            request: request.clone(),
            timestamp: std::time::Instant::now(),
        });
        inner.call_history.len() - 1
    }

    async fn simulate_latency(&self) {
        let latency_ms = self.inner.read().latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(latency_ms)).await;
        }
    }

    fn estimate_tokens(messages: &[ChatMessage]) -> u32 {
        let total_chars: usize = messages.iter().map(|m| m.content.len()).sum();
        (total_chars / 4) as u32
    }
}

impl Default for MockLLMProvider {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        request: &CompletionRequest,
    ) -> Result<LLMResponse, LLMError> {
        let call_index = self.record_call(messages, request);
        self.simulate_latency().await;

        {
            let inner = self.inner.read();
            if inner.should_error || inner.error_on_call == Some(call_index) {
                return Err(LLMError::Other(inner.error_message.clone()));
            }
        }

        let mut response = self.get_next_response();

        if response.usage.is_none() {
            let prompt_tokens = Self::estimate_tokens(messages);
            let completion_tokens =
                (response.content.as_deref().unwrap_or_default().len() / 4) as u32;
            response.usage = Some(TokenUsage::new(prompt_tokens, completion_tokens));
        }

        Ok(response)
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn supports(&self, feature: LLMFeature) -> bool {
        self.inner.read().features.contains(&feature)
    }
}
