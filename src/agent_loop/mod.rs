//! Agent Loop / Interpreter (spec §4.2).
//!
//! Corresponds to `local_interpreter/coordinator/loop.py`'s think -> act ->
//! observe cycle: the orchestrator proposes a `ToolDecision`, the loop
//! executes it (sandboxed code, a registry tool call, or termination), the
//! result is appended to history, and the cycle repeats up to an iteration
//! ceiling. External calls made while `os_mode` and `safety_mode` are both
//! on are staged for operator approval rather than run immediately (spec
//! §4.2 "Safety gate staging"): a newly staged decision replaces any
//! previously staged one, emitting a status event on replacement.

pub mod history;
pub mod orchestrator;
pub mod sandbox;
pub mod screen;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{CoreError, CoreResult};
use crate::intent::IntentRegistry;
use crate::registry::ExtensionRegistry;
use crate::tool::{InvokeArgs, PartialDecision, ToolDecision, ToolResult};

use history::{ConversationTurn, Content, ContentPart, History, Role};
use orchestrator::Orchestrator;
use sandbox::Sandbox;
use screen::ScreenCapture;

/// One observable step of the loop, surfaced to callers (a CLI, a UI) as it
/// happens rather than only once the loop finishes (spec §4.2 "run()
/// returning an event stream").
#[derive(Debug, Clone)]
pub enum Event {
    Status(String),
    ThoughtChunk(String),
    CodeChunk(String),
    Screenshot { mime: String, data_base64: String },
    Observation(ToolResult),
    Final(String),
}

/// Where a call to `run`/`run_approved` left off.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// The loop reached a `Final` decision or its iteration ceiling.
    Final(String),
    /// An external call under `os_mode` + `safety_mode` is staged; call
    /// `run_approved` (to execute it) or `discard_staged` (to drop it).
    AwaitingApproval { tool_name: String, args: Vec<String> },
}

struct Staged {
    iteration: usize,
    decision: ToolDecision,
}

/// Drives one conversation's think -> act -> observe cycle.
pub struct AgentLoop {
    registry: Arc<ExtensionRegistry>,
    intents: Arc<IntentRegistry>,
    orchestrator: Arc<dyn Orchestrator>,
    sandbox: Sandbox,
    max_iterations: usize,
    /// Whether this loop instance controls the desktop (vision model,
    /// screenshots, and the staged-approval gate) or stays in the plain
    /// code/tool-calling mode.
    os_mode: bool,
    /// Whether external calls in `os_mode` require operator approval before
    /// running.
    safety_mode: bool,
    intent_threshold: f64,
    staged: Mutex<Option<Staged>>,
    /// Embedder-supplied screen grabber, consulted once per iteration while
    /// `os_mode` is on (spec §4.2 step 2a). `None` means this loop instance
    /// has no capture collaborator wired in, and the capture step is skipped.
    screen: Option<Arc<dyn ScreenCapture>>,
}

impl AgentLoop {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        intents: Arc<IntentRegistry>,
        orchestrator: Arc<dyn Orchestrator>,
        max_iterations: usize,
        os_mode: bool,
        safety_mode: bool,
    ) -> Self {
        Self::with_screen_capture(registry, intents, orchestrator, max_iterations, os_mode, safety_mode, None)
    }

    /// Same as [`Self::new`], additionally wiring an OS-mode screen capture
    /// collaborator.
    pub fn with_screen_capture(
        registry: Arc<ExtensionRegistry>,
        intents: Arc<IntentRegistry>,
        orchestrator: Arc<dyn Orchestrator>,
        max_iterations: usize,
        os_mode: bool,
        safety_mode: bool,
        screen: Option<Arc<dyn ScreenCapture>>,
    ) -> Self {
        Self {
            sandbox: Sandbox::new(registry.clone()),
            registry,
            intents,
            orchestrator,
            max_iterations,
            os_mode,
            safety_mode,
            intent_threshold: 0.35,
            staged: Mutex::new(None),
            screen,
        }
    }

    /// Start a new turn for `utterance`. Tries the local intent fast path
    /// first (spec §4.3 "why a local fast path exists"); only intents that
    /// don't need entity extraction can resolve without the LLM.
    pub async fn run(
        &self,
        utterance: String,
        history: &mut History,
        events: &UnboundedSender<Event>,
    ) -> CoreResult<LoopOutcome> {
        if let Some(name) = self.intents.match_utterance(&utterance, self.intent_threshold) {
            if let Some(intent) = self.intents.get(&name) {
                if !intent.requires_entities {
                    let dispatched = self.intents.dispatch(
                        &name,
                        InvokeArgs::Handler {
                            command: name.clone(),
                            args: std::collections::HashMap::new(),
                        },
                    )?;
                    // An unknown intent or a failing handler falls through to
                    // the normal LLM-driven path rather than aborting the turn
                    // (spec §4.3 "Unknown intent -> none... never propagate").
                    if let Some(result) = dispatched {
                        let _ = events.send(Event::Status(format!("matched local intent '{name}'")));
                        let _ = events.send(Event::Observation(result.clone()));
                        let message = if result.is_success() {
                            result.output
                        } else {
                            result.error
                        };
                        let _ = events.send(Event::Final(message.clone()));
                        return Ok(LoopOutcome::Final(message));
                    }
                }
            }
        }

        history.push(ConversationTurn::user_text(utterance));
        self.iterate(history, events, 0).await
    }

    /// Execute the currently staged external call and resume the loop.
    pub async fn run_approved(
        &self,
        history: &mut History,
        events: &UnboundedSender<Event>,
    ) -> CoreResult<LoopOutcome> {
        let Staged { iteration, decision } = self
            .staged
            .lock()
            .take()
            .ok_or_else(|| CoreError::SandboxDenied("no staged action awaiting approval".to_string()))?;

        let ToolDecision::External { tool_name, args, .. } = decision else {
            return Err(CoreError::MalformedDecision("staged decision was not external".to_string()));
        };

        let result = self.sandbox.execute_os_mode(&tool_name, args).await;
        self.observe(history, events, result)?;
        self.iterate(history, events, iteration).await
    }

    /// Drop the currently staged action without running it.
    pub fn discard_staged(&self) {
        self.staged.lock().take();
    }

    async fn iterate(
        &self,
        history: &mut History,
        events: &UnboundedSender<Event>,
        start_iteration: usize,
    ) -> CoreResult<LoopOutcome> {
        for iteration in start_iteration..self.max_iterations {
            if self.os_mode {
                self.capture_screen(history, events).await;
            }
            history.downgrade_stale_images();
            let _ = events.send(Event::Status(format!("iteration {}", iteration + 1)));

            let tools = self.registry.list_tools();
            let mut last_thought = String::new();
            let mut last_preview = String::new();
            let mut on_partial = |partial: &PartialDecision| {
                let thought_so_far = partial.thought_so_far();
                let delta = thought_so_far.strip_prefix(last_thought.as_str()).unwrap_or(thought_so_far);
                if !delta.is_empty() {
                    let _ = events.send(Event::ThoughtChunk(delta.to_string()));
                }
                last_thought = thought_so_far.to_string();

                let preview_so_far = partial.preview_so_far();
                let delta = preview_so_far
                    .strip_prefix(last_preview.as_str())
                    .unwrap_or(preview_so_far.as_str())
                    .to_string();
                if !delta.is_empty() {
                    let _ = events.send(Event::CodeChunk(delta));
                }
                last_preview = preview_so_far;
            };
            let decision = self
                .orchestrator
                .decide_streaming(history.turns(), &tools, self.os_mode, &mut on_partial)
                .await;

            match decision {
                ToolDecision::Final { message, .. } => {
                    history.push(ConversationTurn::assistant_text(message.clone()));
                    let _ = events.send(Event::Final(message.clone()));
                    return Ok(LoopOutcome::Final(message));
                }
                ToolDecision::Python { code, .. } => {
                    let result = self.sandbox.execute(&code);
                    self.observe(history, events, result)?;
                }
                ToolDecision::External { tool_name, args, .. } => {
                    if self.os_mode && self.safety_mode {
                        let mut guard = self.staged.lock();
                        let replaced = guard.is_some();
                        *guard = Some(Staged {
                            iteration: iteration + 1,
                            decision: ToolDecision::External {
                                thought: String::new(),
                                tool_name: tool_name.clone(),
                                args: args.clone(),
                            },
                        });
                        drop(guard);
                        if replaced {
                            let _ = events.send(Event::Status(
                                "replacing previously staged action with a new one".to_string(),
                            ));
                        }
                        let _ = events.send(Event::Status(format!("awaiting approval for '{tool_name}'")));
                        return Ok(LoopOutcome::AwaitingApproval { tool_name, args });
                    }

                    let result = if self.os_mode {
                        self.sandbox.execute_os_mode(&tool_name, args).await
                    } else {
                        self.registry.invoke(&tool_name, InvokeArgs::Program(args)).await
                    };
                    self.observe(history, events, result)?;
                }
            }
        }

        let message = format!(
            "Reached the iteration limit ({}) without a final answer.",
            self.max_iterations
        );
        history.push(ConversationTurn::assistant_text(message.clone()));
        let _ = events.send(Event::Final(message.clone()));
        Ok(LoopOutcome::Final(message))
    }

    /// In OS mode, grab a fresh frame from the screen capture collaborator
    /// and prepend it as a user turn (spec §4.2 step 2a). A missing
    /// collaborator or a capture failure is logged and skipped rather than
    /// failing the turn — the loop still has the tool catalogue to fall
    /// back on.
    async fn capture_screen(&self, history: &mut History, events: &UnboundedSender<Event>) {
        let Some(screen) = &self.screen else { return };
        match screen.capture().await {
            Ok(frame) => {
                let _ = events.send(Event::Screenshot {
                    mime: frame.mime.clone(),
                    data_base64: frame.data_base64.clone(),
                });
                history.push(ConversationTurn {
                    role: Role::User,
                    content: Content::Parts(vec![
                        ContentPart::Text {
                            text: "Current screen observation".to_string(),
                        },
                        ContentPart::Image {
                            mime: frame.mime,
                            data_base64: frame.data_base64,
                        },
                    ]),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "screen capture failed");
            }
        }
    }

    /// Append an observation to history and emit the matching events. Tool
    /// errors never end the loop (spec §4.2 "Failure semantics") — they are
    /// fed back as the observation text.
    fn observe(
        &self,
        history: &mut History,
        events: &UnboundedSender<Event>,
        result: CoreResult<ToolResult>,
    ) -> CoreResult<()> {
        let result = match result {
            Ok(r) => r,
            Err(e) => ToolResult::err(e.to_string()),
        };
        let _ = events.send(Event::Observation(result.clone()));
        if let Some(artifact) = &result.artifact {
            if artifact.mime.starts_with("image/") {
                let _ = events.send(Event::Screenshot {
                    mime: artifact.mime.clone(),
                    data_base64: artifact.data_base64.clone(),
                });
            }
        }

        let text = if result.is_success() {
            result.output.clone()
        } else {
            format!("Error: {}", result.error)
        };
        let turn = match &result.artifact {
            Some(artifact) if artifact.mime.starts_with("image/") => ConversationTurn {
                role: Role::Tool,
                content: Content::Parts(vec![
                    ContentPart::Text { text },
                    ContentPart::Image {
                        mime: artifact.mime.clone(),
                        data_base64: artifact.data_base64.clone(),
                    },
                ]),
            },
            _ => ConversationTurn::tool_text(text),
        };
        history.push(turn);
        Ok(())
    }
}
