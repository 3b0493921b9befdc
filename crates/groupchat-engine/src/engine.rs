use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{ContextCache, trim_to_window};
use crate::options::RespondOptions;
use crate::persistence::WriteThrough;
use crate::prompt::build_system_prompt;
use crate::record::restore_turns;
use groupchat_core::{
    ChatError, ChatMessage, CompletionRequest, HistoryStore, LLMFeature, LLMProvider, LLMResponse,
    MemoryEntry, MemoryStore, Result, Role, ToolCall, ToolChoice, ToolDefinition, ToolResult,
};
use groupchat_tools::{ToolRequest, memory_tool_definition, save_memory};

pub const DEFAULT_PRUNE_DAYS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub cached_turns: usize,
    /// `None` when no history store is configured.
    pub stored_turns: Option<usize>,
    /// `None` when no memory store is configured.
    pub memories: Option<usize>,
}

/// Where a single `respond` call is in its model round-trip.
#[derive(Debug)]
enum TurnState {
    AwaitingModel { offer_tools: bool },
    ToolRequested(LLMResponse),
    ToolExecuted,
    Answered(Option<String>),
}

/// Keeps per-conversation context for a group chat bot and drives the model
/// round-trip for each inbound utterance.
///
/// Turns for the same conversation must be submitted one at a time; distinct
/// conversations may be served concurrently.
pub struct ConversationEngine {
    llm: Arc<dyn LLMProvider>,
    cache: Arc<ContextCache>,
    history: Option<WriteThrough>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("llm", &self.llm.provider_name())
            .field("cached_conversations", &self.cache.len())
            .field("has_history", &self.history.is_some())
            .field("has_memory", &self.memory.is_some())
            .finish()
    }
}

impl ConversationEngine {
    pub fn builder() -> ConversationEngineBuilder {
        ConversationEngineBuilder::new()
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    /// History writes dropped after a store failure.
    pub fn dropped_writes(&self) -> u64 {
        self.history.as_ref().map_or(0, |h| h.dropped_writes())
    }

    /// Produces the bot's reply to `utterance` in `conversation_id`.
    ///
    /// `Ok(None)` means the model answered without any text.
    #[instrument(skip(self, utterance, options), fields(conversation_id = %conversation_id))]
    pub async fn respond(
        &self,
        utterance: &str,
        conversation_id: &str,
        options: &RespondOptions,
    ) -> Result<Option<String>> {
        info!(utterance_len = utterance.len(), "Responding");

        let mut turns = match self.cache.get(conversation_id) {
            Some(turns) => turns,
            None => self.hydrate(conversation_id, options).await?,
        };

        let user = ChatMessage::user(options.user_content(utterance));
        self.push_turn(conversation_id, &mut turns, user, options)
            .await;
        self.trim_context(conversation_id, &mut turns, options);

        let tools = self.advertised_tools(options);
        let mut request = CompletionRequest::new()
            .with_model(&options.model)
            .with_temperature(options.temperature);
        let offer_tools = !tools.is_empty();
        if offer_tools {
            request = request.with_tools(tools, ToolChoice::Auto);
        }

        let mut tool_calls = 0usize;
        let mut state = TurnState::AwaitingModel { offer_tools };
        loop {
            state = match state {
                TurnState::AwaitingModel { offer_tools } => {
                    let call_request = if offer_tools {
                        request.clone()
                    } else {
                        request.without_tools()
                    };
                    let response = self.complete(&turns, &call_request).await?;

                    if !response.requests_tools() {
                        TurnState::Answered(response.content)
                    } else if offer_tools {
                        TurnState::ToolRequested(response)
                    } else {
                        warn!(
                            requested = response.tool_calls.len(),
                            "Model requested tools that were not offered, using its text"
                        );
                        TurnState::Answered(response.content)
                    }
                }
                TurnState::ToolRequested(response) => {
                    tool_calls += response.tool_calls.len();
                    self.run_tools(conversation_id, &mut turns, response, options)
                        .await?;
                    TurnState::ToolExecuted
                }
                TurnState::ToolExecuted => TurnState::AwaitingModel { offer_tools: false },
                TurnState::Answered(content) => {
                    let reply = ChatMessage::assistant(content.clone().unwrap_or_default());
                    self.push_turn(conversation_id, &mut turns, reply, options)
                        .await;
                    self.trim_context(conversation_id, &mut turns, options);

                    if content.is_none() {
                        warn!("Model returned no content");
                    }
                    info!(tool_calls, cached_turns = turns.len(), "Turn completed");
                    return Ok(content);
                }
            };
        }
    }

    async fn hydrate(
        &self,
        conversation_id: &str,
        options: &RespondOptions,
    ) -> Result<Vec<ChatMessage>> {
        let turns = match self.writer(options) {
            Some(writer) => {
                let records = writer
                    .store()
                    .read_recent(conversation_id, options.window_len())
                    .await?;

                if records.is_empty() {
                    let system = self.fresh_system_turn(conversation_id, options).await?;
                    writer.record(conversation_id, &system).await;
                    debug!("Started new persisted conversation");
                    vec![system]
                } else {
                    let fallback = if records[0].role == Role::System {
                        None
                    } else {
                        Some(self.fresh_system_turn(conversation_id, options).await?)
                    };
                    let (turns, synthesized) = restore_turns(&records, || {
                        fallback.unwrap_or_else(|| ChatMessage::system(&options.system_prompt))
                    });
                    debug!(
                        records = records.len(),
                        turns = turns.len(),
                        synthesized_system = synthesized,
                        "Hydrated conversation from history"
                    );
                    turns
                }
            }
            None => {
                if options.use_persistence {
                    debug!("Persistence requested without a history store");
                }
                vec![self.fresh_system_turn(conversation_id, options).await?]
            }
        };

        self.cache.set(conversation_id, turns.clone());
        Ok(turns)
    }

    async fn fresh_system_turn(
        &self,
        conversation_id: &str,
        options: &RespondOptions,
    ) -> Result<ChatMessage> {
        let memories = match (&self.memory, options.use_memory) {
            (Some(store), true) => store.list(conversation_id, None).await?,
            _ => Vec::new(),
        };
        if !memories.is_empty() {
            debug!(memories = memories.len(), "Loaded memories into system prompt");
        }
        Ok(ChatMessage::system(build_system_prompt(
            &options.system_prompt,
            &memories,
        )))
    }

    /// Appends to the working copy, publishes it to the cache and then writes
    /// the turn through when persistence is on.
    async fn push_turn(
        &self,
        conversation_id: &str,
        turns: &mut Vec<ChatMessage>,
        turn: ChatMessage,
        options: &RespondOptions,
    ) {
        let pending = self.writer(options).map(|writer| (writer, turn.clone()));

        turns.push(turn);
        self.cache.set(conversation_id, turns.clone());

        if let Some((writer, turn)) = pending {
            writer.record(conversation_id, &turn).await;
        }
    }

    /// Only called outside a tool round, so the current utterance and the
    /// round it triggered always reach the second completion call intact.
    fn trim_context(
        &self,
        conversation_id: &str,
        turns: &mut Vec<ChatMessage>,
        options: &RespondOptions,
    ) {
        let removed = trim_to_window(turns, options.window_len());
        if removed > 0 {
            debug!(removed, kept = turns.len(), "Trimmed context window");
            self.cache.set(conversation_id, turns.clone());
        }
    }

    fn writer(&self, options: &RespondOptions) -> Option<&WriteThrough> {
        self.history.as_ref().filter(|_| options.use_persistence)
    }

    fn advertised_tools(&self, options: &RespondOptions) -> Vec<ToolDefinition> {
        if !options.use_memory {
            return Vec::new();
        }
        if self.memory.is_none() {
            warn!("Memory requested without a memory store, not offering the memory tool");
            return Vec::new();
        }
        if !self.llm.supports(LLMFeature::FunctionCalling) {
            warn!(
                provider = self.llm.provider_name(),
                "Provider lacks function calling, not offering the memory tool"
            );
            return Vec::new();
        }
        vec![memory_tool_definition()]
    }

    async fn complete(
        &self,
        turns: &[ChatMessage],
        request: &CompletionRequest,
    ) -> Result<LLMResponse> {
        debug!(
            turns = turns.len(),
            tools = request.tools.len(),
            "Calling completion provider"
        );
        self.llm.complete(turns, request).await.map_err(|e| {
            error!(error = %e, provider = self.llm.provider_name(), "Completion failed");
            ChatError::from(e)
        })
    }

    /// Decodes and executes every requested call before touching the context,
    /// so a rejected call leaves no half-finished round behind.
    async fn run_tools(
        &self,
        conversation_id: &str,
        turns: &mut Vec<ChatMessage>,
        response: LLMResponse,
        options: &RespondOptions,
    ) -> Result<()> {
        let mut requests = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let request = ToolRequest::decode(call).inspect_err(|e| {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Rejected tool call");
            })?;
            requests.push(request);
        }

        let mut results = Vec::with_capacity(requests.len());
        for (call, request) in response.tool_calls.iter().zip(&requests) {
            results.push(self.execute_tool(conversation_id, call, request).await?);
        }

        let LLMResponse {
            content,
            tool_calls,
            ..
        } = response;
        let ids: Vec<String> = tool_calls.iter().map(|c| c.id.clone()).collect();

        let invocation = ChatMessage::assistant_tool_calls(content.unwrap_or_default(), tool_calls);
        self.push_turn(conversation_id, turns, invocation, options)
            .await;
        for (id, result) in ids.into_iter().zip(results) {
            self.push_turn(conversation_id, turns, ChatMessage::tool(id, result.output), options)
                .await;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(tool = %call.name, call_id = %call.id))]
    async fn execute_tool(
        &self,
        conversation_id: &str,
        call: &ToolCall,
        request: &ToolRequest,
    ) -> Result<ToolResult> {
        match request {
            ToolRequest::AddMemory(args) => match &self.memory {
                Some(store) => {
                    let result = save_memory(store.as_ref(), conversation_id, args).await?;
                    info!("Memory saved");
                    Ok(result)
                }
                None => Ok(ToolResult::error("Memory is not enabled for this conversation.")),
            },
            ToolRequest::Unknown { name } => {
                warn!("Model called an unknown tool");
                Ok(ToolResult::error(format!("Unknown tool: {}", name)))
            }
        }
    }

    /// Forgets the cached context of one conversation. With `also_clear_store`
    /// its stored history is deleted too; memories are kept either way.
    #[instrument(skip(self))]
    pub async fn reset_one(&self, conversation_id: &str, also_clear_store: bool) -> Result<()> {
        let evicted = self.cache.delete(conversation_id);
        if also_clear_store {
            if let Some(history) = &self.history {
                history.store().clear(conversation_id).await?;
            }
        }
        info!(evicted, also_clear_store, "Conversation reset");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn reset_all(&self, also_clear_store: bool) -> Result<()> {
        let evicted = self.cache.len();
        self.cache.clear();
        if also_clear_store {
            if let Some(history) = &self.history {
                history.store().clear_all().await?;
            }
        }
        info!(evicted, also_clear_store, "All conversations reset");
        Ok(())
    }

    fn memory_store(&self) -> Result<&Arc<dyn MemoryStore>> {
        self.memory
            .as_ref()
            .ok_or_else(|| ChatError::Config("no memory store configured".into()))
    }

    fn history_store(&self) -> Result<&Arc<dyn HistoryStore>> {
        self.history
            .as_ref()
            .map(|h| h.store())
            .ok_or_else(|| ChatError::Config("no history store configured".into()))
    }

    /// Newest first.
    pub async fn list_memories(&self, conversation_id: &str) -> Result<Vec<MemoryEntry>> {
        self.memory_store()?.list(conversation_id, None).await
    }

    pub async fn search_memories(
        &self,
        conversation_id: &str,
        keyword: &str,
    ) -> Result<Vec<MemoryEntry>> {
        self.memory_store()?.search(conversation_id, keyword).await
    }

    pub async fn memory_count(&self, conversation_id: &str) -> Result<usize> {
        self.memory_store()?.count(conversation_id).await
    }

    #[instrument(skip(self, text))]
    pub async fn forget_memory(&self, conversation_id: &str, text: &str) -> Result<usize> {
        let removed = self.memory_store()?.remove(conversation_id, text).await?;
        info!(removed, "Forgot memory");
        Ok(removed)
    }

    #[instrument(skip(self))]
    pub async fn clear_memories(&self, conversation_id: &str) -> Result<()> {
        self.memory_store()?.clear(conversation_id).await?;
        info!("Cleared memories");
        Ok(())
    }

    pub async fn conversation_stats(&self, conversation_id: &str) -> Result<ConversationStats> {
        let stored_turns = match &self.history {
            Some(history) => Some(history.store().count(conversation_id).await?),
            None => None,
        };
        let memories = match &self.memory {
            Some(store) => Some(store.count(conversation_id).await?),
            None => None,
        };
        Ok(ConversationStats {
            cached_turns: self.cache.turn_count(conversation_id),
            stored_turns,
            memories,
        })
    }

    /// Deletes stored history older than `days` across all conversations.
    /// Cached context is left alone.
    #[instrument(skip(self))]
    pub async fn prune_history(&self, days: u32) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let removed = self.history_store()?.prune_before(cutoff).await?;
        info!(removed, "Pruned history");
        Ok(removed)
    }
}

pub struct ConversationEngineBuilder {
    llm: Option<Arc<dyn LLMProvider>>,
    cache: Option<Arc<ContextCache>>,
    history: Option<Arc<dyn HistoryStore>>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ConversationEngineBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            cache: None,
            history: None,
            memory: None,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Shares an existing cache. A fresh empty one is created otherwise.
    pub fn cache(mut self, cache: Arc<ContextCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(store);
        self
    }

    pub fn memory_store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(store);
        self
    }

    pub fn build(self) -> Result<ConversationEngine> {
        let llm = self
            .llm
            .ok_or_else(|| ChatError::Config("LLM provider is required".into()))?;

        Ok(ConversationEngine {
            llm,
            cache: self.cache.unwrap_or_default(),
            history: self.history.map(WriteThrough::new),
            memory: self.memory,
        })
    }
}

impl Default for ConversationEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
