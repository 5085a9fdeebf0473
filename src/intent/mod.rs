//! Intent Registry & Local Matcher (spec §4.3).
//!
//! Corresponds to `butler/core/intent_dispatcher.py`'s `IntentRegistry`: a
//! table of named intents, each carrying a docstring used for matching and
//! a handler dispatched on match, plus `match_intent_locally`'s cosine
//! similarity fast path. The local matcher lets a well-understood
//! utterance resolve without a round trip to the LLM orchestrator (spec
//! §4.3 "why a local fast path exists").

pub mod similarity;

use std::panic::AssertUnwindSafe;

use dashmap::DashMap;

use crate::error::CoreResult;
use crate::registry::HandlerFn;
use crate::tool::{InvokeArgs, ToolResult};

/// A registered intent: its matching text and whether a match still needs
/// entity extraction before it can be dispatched (spec §4.3 "requires_entities").
#[derive(Debug, Clone)]
pub struct Intent {
    pub name: String,
    pub docstring: String,
    pub requires_entities: bool,
}

/// The intent table plus the handler each intent dispatches to.
pub struct IntentRegistry {
    intents: DashMap<String, Intent>,
    handlers: DashMap<String, HandlerFn>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self {
            intents: DashMap::new(),
            handlers: DashMap::new(),
        }
    }

    /// Register (or rebind, if already present) an intent and its handler.
    pub fn register(
        &self,
        name: impl Into<String>,
        docstring: impl Into<String>,
        requires_entities: bool,
        handler: HandlerFn,
    ) {
        let name = name.into();
        self.intents.insert(
            name.clone(),
            Intent {
                name: name.clone(),
                docstring: docstring.into(),
                requires_entities,
            },
        );
        self.handlers.insert(name, handler);
    }

    /// All registered intents, sorted by name.
    pub fn get_all_intents(&self) -> Vec<Intent> {
        let mut intents: Vec<_> = self.intents.iter().map(|e| e.value().clone()).collect();
        intents.sort_by(|a, b| a.name.cmp(&b.name));
        intents
    }

    pub fn get(&self, name: &str) -> Option<Intent> {
        self.intents.get(name).map(|e| e.value().clone())
    }

    /// Dispatch a matched intent by name. An unknown intent or a failing
    /// handler (panic or returned `Err`) never propagates to the caller —
    /// both log and resolve to `Ok(None)` so the agent loop can fall through
    /// to the LLM-driven path instead of aborting the turn (spec §4.3
    /// "Unknown intent -> none. Handler exception -> return none and log;
    /// never propagate to the loop.").
    pub fn dispatch(&self, name: &str, args: InvokeArgs) -> CoreResult<Option<ToolResult>> {
        let Some(handler) = self.handlers.get(name).map(|e| e.value().clone()) else {
            tracing::warn!(intent = name, "dispatch requested for unknown intent");
            return Ok(None);
        };

        let (command, kwargs) = match args {
            InvokeArgs::Handler { command, args } => (command, args),
            other => (name.to_string(), {
                let mut map = std::collections::HashMap::new();
                map.insert("args".to_string(), serde_json::Value::String(other.preview()));
                map
            }),
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(&command, &kwargs))) {
            Ok(Ok(result)) => Ok(Some(result)),
            Ok(Err(e)) => {
                tracing::error!(intent = name, error = %e, "intent handler returned an error");
                Ok(None)
            }
            Err(_) => {
                tracing::error!(intent = name, "intent handler panicked");
                Ok(None)
            }
        }
    }

    /// Match `utterance` against every registered intent's docstring via
    /// TF-IDF cosine similarity, returning the best match at or above
    /// `threshold`. Ties are broken by lexicographically-smallest intent
    /// name for determinism (spec §4.3.1).
    pub fn match_utterance(&self, utterance: &str, threshold: f64) -> Option<String> {
        let query_tokens = similarity::tokenize(utterance);
        let mut best: Option<(String, f64)> = None;

        for intent in self.get_all_intents() {
            let doc_tokens = similarity::tokenize(&intent.docstring);
            let score = similarity::tfidf_cosine_similarity(&query_tokens, &doc_tokens);
            if score < threshold {
                continue;
            }
            best = match best {
                None => Some((intent.name, score)),
                Some((best_name, best_score)) => {
                    if score > best_score || (score == best_score && intent.name < best_name) {
                        Some((intent.name, score))
                    } else {
                        Some((best_name, best_score))
                    }
                }
            };
        }
        best.map(|(name, _)| name)
    }
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn match_utterance_picks_closest_docstring() {
        let registry = IntentRegistry::new();
        registry.register(
            "get_weather",
            "Get the current weather for a city",
            true,
            Arc::new(|_, _| Ok(ToolResult::ok(""))),
        );
        registry.register(
            "set_volume",
            "Set the system volume level",
            true,
            Arc::new(|_, _| Ok(ToolResult::ok(""))),
        );
        let matched = registry.match_utterance("what's the weather like in Tokyo", 0.1);
        assert_eq!(matched, Some("get_weather".to_string()));
    }

    #[test]
    fn match_utterance_returns_none_below_threshold() {
        let registry = IntentRegistry::new();
        registry.register(
            "get_weather",
            "Get the current weather for a city",
            true,
            Arc::new(|_, _| Ok(ToolResult::ok(""))),
        );
        let matched = registry.match_utterance("completely unrelated gibberish", 0.5);
        assert_eq!(matched, None);
    }

    #[test]
    fn dispatch_catches_handler_panic() {
        let registry = IntentRegistry::new();
        registry.register(
            "boom",
            "Always panics",
            false,
            Arc::new(|_, _| panic!("boom")),
        );
        let result = registry
            .dispatch(
                "boom",
                InvokeArgs::Handler {
                    command: "boom".to_string(),
                    args: std::collections::HashMap::new(),
                },
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn dispatch_unknown_intent_returns_none() {
        let registry = IntentRegistry::new();
        let result = registry
            .dispatch(
                "nope",
                InvokeArgs::Handler {
                    command: "nope".to_string(),
                    args: std::collections::HashMap::new(),
                },
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn dispatch_handler_error_returns_none() {
        let registry = IntentRegistry::new();
        registry.register(
            "fails",
            "Always fails",
            false,
            Arc::new(|_, _| Err(crate::error::CoreError::SandboxDenied("nope".to_string()))),
        );
        let result = registry
            .dispatch(
                "fails",
                InvokeArgs::Handler {
                    command: "fails".to_string(),
                    args: std::collections::HashMap::new(),
                },
            )
            .unwrap();
        assert!(result.is_none());
    }
}
