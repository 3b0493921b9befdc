use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use groupchat_core::{
    ChatMessage, CompletionRequest, FinishReason, LLMError, LLMFeature, LLMProvider, LLMResponse,
    Role, TokenUsage, ToolCall,
};

fn default_base_url() -> String {
    "https://api.moonshot.cn/v1".to_string()
}

fn default_model() -> String {
    "kimi-k2-turbo-preview".to_string()
}

fn default_api_key_env() -> String {
    "MOONSHOT_API_KEY".to_string()
}

/// Connection settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Used when a request does not name a model.
    #[serde(default = "default_model")]
    pub model: String,

    /// Inline key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionDef<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Chat completions over HTTP for any OpenAI-compatible API (Moonshot, OpenAI,
/// DeepSeek, a local vLLM, ...), including native tool calling.
#[derive(Debug)]
pub struct OpenAICompatProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAICompatProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, LLMError> {
        let api_key = match config.api_key.clone() {
            Some(key) => key,
            None => std::env::var(&config.api_key_env).map_err(|_| {
                LLMError::Config(format!(
                    "API key not found in environment variable {}",
                    config.api_key_env
                ))
            })?,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| LLMError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn convert_message(msg: &ChatMessage) -> WireMessage {
        let tool_calls = if msg.has_tool_calls() {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        kind: function_kind(),
                        function: WireFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        } else {
            None
        };

        let content = if msg.role == Role::Assistant && msg.has_tool_calls() && msg.content.is_empty()
        {
            None
        } else {
            Some(msg.content.clone())
        };

        WireMessage {
            role: msg.role.as_str().to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    fn build_body<'a>(
        &'a self,
        messages: &[ChatMessage],
        request: &'a CompletionRequest,
    ) -> WireRequest<'a> {
        let tools = request
            .tools
            .iter()
            .map(|tool| WireTool {
                kind: "function",
                function: WireFunctionDef {
                    name: &tool.name,
                    description: &tool.description,
                    parameters: &tool.parameters,
                },
            })
            .collect::<Vec<_>>();

        let tool_choice = if tools.is_empty() {
            None
        } else {
            request.tool_choice.map(|c| c.as_str())
        };

        WireRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: messages.iter().map(Self::convert_message).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools,
            tool_choice,
        }
    }

    fn parse_response(body: &str) -> Result<LLMResponse, LLMError> {
        let wire: WireResponse = serde_json::from_str(body)?;
        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::API {
                message: "response contained no choices".to_string(),
                status: None,
            })?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall::new(call.id, call.function.name, call.function.arguments))
            .collect();

        let finish_reason = match choice.finish_reason.as_deref() {
            Some(reason) => FinishReason::from_wire(reason),
            None if !tool_calls.is_empty() => FinishReason::ToolCall,
            None => FinishReason::Stop,
        };

        Ok(LLMResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason,
            usage: wire
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
            model: wire.model,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        request: &CompletionRequest,
    ) -> Result<LLMResponse, LLMError> {
        let body = self.build_body(messages, request);
        debug!(
            model = body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(LLMError::RateLimit { retry_after });
        }

        let text = response
            .text()
            .await
            .map_err(|e| LLMError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(LLMError::API {
                message: format!("LLM provider error: {}", text),
                status: Some(status.as_u16()),
            });
        }

        Self::parse_response(&text)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }

    fn supports(&self, feature: LLMFeature) -> bool {
        match feature {
            LLMFeature::SystemMessages | LLMFeature::FunctionCalling | LLMFeature::JsonMode => true,
            LLMFeature::Streaming => false,
        }
    }
}

pub struct ProviderBuilder {
    config: ProviderConfig,
}

impl ProviderBuilder {
    pub fn new() -> Self {
        Self {
            config: ProviderConfig::default(),
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    pub fn api_key_env(mut self, env_var: impl Into<String>) -> Self {
        self.config.api_key_env = env_var.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> Result<OpenAICompatProvider, LLMError> {
        if self.config.model.trim().is_empty() {
            return Err(LLMError::Config("Model not set".to_string()));
        }
        OpenAICompatProvider::new(&self.config)
    }
}

impl Default for ProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupchat_core::{ToolChoice, ToolDefinition};

    fn provider() -> OpenAICompatProvider {
        ProviderBuilder::new()
            .base_url("https://api.example.com/v1/")
            .model("test-model")
            .api_key("XXXXXXXXXX")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder() {
        let provider = provider();
        assert_eq!(provider.provider_name(), "openai-compatible");
        assert_eq!(provider.model_name(), "test-model");
        assert_eq!(provider.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_builder_missing_model() {
        let result = ProviderBuilder::new().model(" ").api_key("k").build();
        assert!(result.unwrap_err().to_string().contains("Model not set"));
    }

    #[test]
    fn test_missing_api_key_env() {
        let result = ProviderBuilder::new()
            .api_key_env("GROUPCHAT_TEST_KEY_THAT_IS_NEVER_SET")
            .build();
        assert!(matches!(result, Err(LLMError::Config(_))));
    }

    #[test]
    fn test_config_defaults_from_yaml() {
        let config: ProviderConfig = serde_yaml::from_str("model: moonshot-v1-8k\n").unwrap();
        assert_eq!(config.model, "moonshot-v1-8k");
        assert_eq!(config.base_url, "https://api.moonshot.cn/v1");
        assert_eq!(config.api_key_env, "MOONSHOT_API_KEY");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_body_carries_tools_and_tool_turns() {
        let provider = provider();
        let call = ToolCall::new("call_1", "add_memory", r#"{"memory_text":"x"}"#);
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("Alice: remember x"),
            ChatMessage::assistant_tool_calls("", vec![call]),
            ChatMessage::tool("call_1", "saved"),
        ];
        let request = CompletionRequest::new().with_temperature(0.6).with_tools(
            vec![ToolDefinition {
                name: "add_memory".into(),
                description: "remember things".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
            ToolChoice::Auto,
        );

        let body = serde_json::to_value(provider.build_body(&messages, &request)).unwrap();
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "add_memory");
        assert!(body["messages"][2]["content"].is_null());
        assert_eq!(body["messages"][2]["tool_calls"][0]["id"], "call_1");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_body_without_tools_omits_tool_choice() {
        let provider = provider();
        let request = CompletionRequest::new().with_model("other-model");
        let body =
            serde_json::to_value(provider.build_body(&[ChatMessage::user("hi")], &request))
                .unwrap();
        assert_eq!(body["model"], "other-model");
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let body = r#"{
            "model": "kimi",
            "choices": [{"message": {"role": "assistant", "content": "Hello Alice"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let response = OpenAICompatProvider::parse_response(body).unwrap();
        assert_eq!(response.content.as_deref(), Some("Hello Alice"));
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_9", "type": "function",
                        "function": {"name": "add_memory", "arguments": "{\"memory_text\":\"Bob is on call\"}"}}]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let response = OpenAICompatProvider::parse_response(body).unwrap();
        assert!(response.content.is_none());
        assert_eq!(response.finish_reason, FinishReason::ToolCall);
        assert_eq!(response.tool_calls[0].id, "call_9");
        assert_eq!(
            response.tool_calls[0].arguments,
            r#"{"memory_text":"Bob is on call"}"#
        );
    }

    #[test]
    fn test_parse_empty_choices_is_error() {
        let result = OpenAICompatProvider::parse_response(r#"{"choices": []}"#);
        assert!(matches!(result, Err(LLMError::API { .. })));
    }
}
