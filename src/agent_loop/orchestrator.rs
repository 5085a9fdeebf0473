//! LLM Orchestrator (spec §4.2 "Agent Loop / Interpreter", supplemented in
//! SPEC_FULL §4.2.2).
//!
//! Corresponds to `local_interpreter/coordinator/orchestrator.py`: builds a
//! system prompt naming every registered tool and its docstring, selects a
//! vision-capable model in OS mode and a code-oriented model otherwise,
//! and streams the response as it's produced. Generalizes
//! `llms/streaming.rs`'s `StreamChunk` handling to this crate's
//! `PartialDecision`.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::CoreError;
use crate::tool::{CatalogueEntry, PartialDecision, ToolDecision};

use super::history::ConversationTurn;

/// Produces the next `ToolDecision` given the conversation so far and the
/// current tool catalogue. Implementations never propagate an error: a
/// failure to reach the LLM or a malformed response degrades to a `Final`
/// decision so the loop always makes progress (spec §4.2.2 "graceful
/// degrade").
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn decide(
        &self,
        history: &[ConversationTurn],
        tools: &[CatalogueEntry],
        os_mode: bool,
    ) -> ToolDecision;

    /// Same as [`Self::decide`], but invokes `on_partial` with the
    /// best-effort decision decoded so far as it arrives (spec §4.2 step
    /// 2b/2c "request a streaming `ToolDecision`... emit `thought_chunk` /
    /// `code_chunk` deltas"). The default implementation has nothing
    /// incremental to offer, so it calls `decide` once and reports the
    /// whole result as a single partial.
    async fn decide_streaming(
        &self,
        history: &[ConversationTurn],
        tools: &[CatalogueEntry],
        os_mode: bool,
        on_partial: &mut (dyn FnMut(&PartialDecision) + Send),
    ) -> ToolDecision {
        let decision = self.decide(history, tools, os_mode).await;
        on_partial(&partial_from_decision(&decision));
        decision
    }
}

/// Project a finished `ToolDecision` back into a `PartialDecision`, used by
/// the default `decide_streaming` to report a non-streaming decision as one
/// complete partial.
fn partial_from_decision(decision: &ToolDecision) -> PartialDecision {
    match decision {
        ToolDecision::Python { thought, code } => PartialDecision {
            tool_type: Some("python".to_string()),
            thought: Some(thought.clone()),
            code: Some(code.clone()),
            ..Default::default()
        },
        ToolDecision::External { thought, tool_name, args } => PartialDecision {
            tool_type: Some("external".to_string()),
            thought: Some(thought.clone()),
            tool_name: Some(tool_name.clone()),
            args: Some(args.clone()),
            ..Default::default()
        },
        ToolDecision::Final { thought, message } => PartialDecision {
            tool_type: Some("final".to_string()),
            thought: Some(thought.clone()),
            message: Some(message.clone()),
            ..Default::default()
        },
    }
}

/// Builds the system prompt naming every tool and its description, the way
/// the original orchestrator renders its tool list into the system message
/// (spec §4.2.2 "system-prompt-per-mode generation").
pub fn system_prompt_for(tools: &[CatalogueEntry], os_mode: bool) -> String {
    let mut prompt = String::new();
    if os_mode {
        prompt.push_str(
            "You control the user's desktop through external tools. Respond only with a JSON \
             object tagged by \"tool_type\": \"python\" (a local expression), \"external\" (a \
             tool invocation), or \"final\" (end the task).\n\n",
        );
    } else {
        prompt.push_str(
            "You are a coding and reasoning assistant. Respond only with a JSON object tagged by \
             \"tool_type\": \"python\" (a local expression), \"external\" (a tool invocation), or \
             \"final\" (end the task).\n\n",
        );
    }
    prompt.push_str("Available tools:\n");
    for tool in tools {
        prompt.push_str(&format!("- {} ({}): {}\n", tool.name, tool.kind, tool.description));
    }
    prompt
}

/// Vision model in OS mode (screenshots are part of the context), the
/// code-oriented model otherwise (spec §4.2.2 "per-mode model selection").
fn select_model(config: &Config, os_mode: bool) -> &str {
    if os_mode {
        &config.llm_vision_model
    } else {
        &config.llm_model
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<DeltaContent>,
    #[serde(default)]
    message: Option<DeltaContent>,
}

#[derive(Debug, Deserialize)]
struct DeltaContent {
    #[serde(default)]
    content: Option<String>,
}

/// A `reqwest`-backed orchestrator talking to an OpenAI-compatible chat
/// completions endpoint.
pub struct LlmOrchestrator {
    client: reqwest::Client,
    config: Config,
}

impl LlmOrchestrator {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn to_chat_messages(history: &[ConversationTurn], system_prompt: &str) -> serde_json::Value {
        let mut messages = vec![json!({ "role": "system", "content": system_prompt })];
        for turn in history {
            let role = match turn.role {
                super::history::Role::User => "user",
                super::history::Role::Assistant => "assistant",
                super::history::Role::Tool => "tool",
            };
            let content = match &turn.content {
                super::history::Content::Plain(text) => json!(text),
                super::history::Content::Parts(parts) => json!(parts
                    .iter()
                    .map(|p| match p {
                        super::history::ContentPart::Text { text } => json!({ "type": "text", "text": text }),
                        super::history::ContentPart::Image { mime, data_base64 } => json!({
                            "type": "image_url",
                            "image_url": { "url": format!("data:{mime};base64,{data_base64}") }
                        }),
                    })
                    .collect::<Vec<_>>()),
            };
            messages.push(json!({ "role": role, "content": content }));
        }
        json!(messages)
    }

    async fn request_completion(
        &self,
        history: &[ConversationTurn],
        tools: &[CatalogueEntry],
        os_mode: bool,
        stream: bool,
    ) -> Result<reqwest::Response, CoreError> {
        let system_prompt = system_prompt_for(tools, os_mode);
        let model = select_model(&self.config, os_mode);
        let body = json!({
            "model": model,
            "messages": Self::to_chat_messages(history, &system_prompt),
            "response_format": { "type": "json_object" },
            "stream": stream,
        });

        self.client
            .post(format!("{}/chat/completions", self.config.llm_base_url))
            .bearer_auth(&self.config.llm_api_key)
            .json(&body)
            .timeout(self.config.llm_timeout)
            .send()
            .await
            .map_err(|e| CoreError::LLMUnavailable(e.to_string()))
    }

}

#[async_trait]
impl Orchestrator for LlmOrchestrator {
    async fn decide(
        &self,
        history: &[ConversationTurn],
        tools: &[CatalogueEntry],
        os_mode: bool,
    ) -> ToolDecision {
        let response = match self.request_completion(history, tools, os_mode, false).await {
            Ok(r) => r,
            Err(e) => return degrade(e),
        };

        let parsed: ChatCompletionResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return degrade(CoreError::LLMUnavailable(e.to_string())),
        };

        let Some(content) = parsed.choices.into_iter().next().and_then(|c| c.message).and_then(|m| m.content) else {
            return degrade(CoreError::MalformedDecision("empty completion".to_string()));
        };

        finalize_buffer(&content)
    }

    /// Streams the decision over SSE, invoking `on_partial` with the
    /// best-effort partial decoded so far as bytes arrive (spec §4.2 step
    /// 2b/2c). Falls back to a `Final` decision if the connection fails or
    /// the accumulated text never parses into a known variant.
    async fn decide_streaming(
        &self,
        history: &[ConversationTurn],
        tools: &[CatalogueEntry],
        os_mode: bool,
        on_partial: &mut (dyn FnMut(&PartialDecision) + Send),
    ) -> ToolDecision {
        let response = match self.request_completion(history, tools, os_mode, true).await {
            Ok(r) => r,
            Err(e) => return degrade(e),
        };

        let mut buffer = String::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let Ok(bytes) = chunk else { break };
            let text = String::from_utf8_lossy(&bytes);
            for line in text.lines() {
                let Some(data) = line.strip_prefix("data: ") else { continue };
                if data.trim() == "[DONE]" {
                    break;
                }
                if let Ok(parsed) = serde_json::from_str::<ChatCompletionResponse>(data) {
                    if let Some(delta) = parsed.choices.first().and_then(|c| c.delta.as_ref()) {
                        if let Some(piece) = &delta.content {
                            buffer.push_str(piece);
                            if let Some(partial) = best_effort_partial(&buffer) {
                                on_partial(&partial);
                            }
                        }
                    }
                }
            }
        }

        finalize_buffer(&buffer)
    }
}

fn degrade(e: CoreError) -> ToolDecision {
    tracing::warn!(error = %e, "orchestrator degrading to final response");
    ToolDecision::Final {
        thought: "Unable to reach the language model.".to_string(),
        message: format!("I couldn't complete that request: {e}"),
    }
}

fn finalize_buffer(buffer: &str) -> ToolDecision {
    match serde_json::from_str::<ToolDecision>(buffer) {
        Ok(decision) => decision,
        Err(e) => degrade(CoreError::MalformedDecision(e.to_string())),
    }
}

/// Best-effort incremental parse: tries the accumulated buffer as a partial
/// decision, tolerating an unterminated JSON object by trimming trailing
/// commas/braces is intentionally NOT attempted here — instead a full
/// `PartialDecision` parse is tried and failures are silently swallowed,
/// since most streamed tokens won't yet form valid JSON.
fn best_effort_partial(buffer: &str) -> Option<PartialDecision> {
    serde_json::from_str::<PartialDecision>(buffer).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_every_tool() {
        let tools = vec![CatalogueEntry {
            name: "weather".to_string(),
            kind: crate::tool::ToolKind::Handler,
            description: "Gets the weather".to_string(),
            signature: None,
        }];
        let prompt = system_prompt_for(&tools, false);
        assert!(prompt.contains("weather"));
        assert!(prompt.contains("Gets the weather"));
    }

    #[test]
    fn os_mode_prompt_mentions_desktop_control() {
        let prompt = system_prompt_for(&[], true);
        assert!(prompt.to_lowercase().contains("desktop"));
    }

    #[test]
    fn select_model_switches_on_os_mode() {
        let config = Config::for_tests();
        assert_eq!(select_model(&config, true), config.llm_vision_model);
        assert_eq!(select_model(&config, false), config.llm_model);
    }

    #[test]
    fn finalize_buffer_degrades_on_malformed_json() {
        let decision = finalize_buffer("not json");
        assert!(matches!(decision, ToolDecision::Final { .. }));
    }

    #[test]
    fn finalize_buffer_parses_final_decision() {
        let decision = finalize_buffer(r#"{"tool_type":"final","thought":"t","message":"done"}"#);
        assert_eq!(
            decision,
            ToolDecision::Final {
                thought: "t".to_string(),
                message: "done".to_string()
            }
        );
    }
}
