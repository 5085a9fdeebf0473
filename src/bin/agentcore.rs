//! CLI demo entry point: a REPL driving one `AgentLoop` against stdin.
//!
//! Corresponds to `butler/main.py`'s REPL, which reads a line, runs it
//! through the interpreter, and prints the streamed thoughts/observations
//! as they arrive. GUI, voice, and OS automation surfaces are out of scope
//! here (spec §1) — this binary only exercises the text-in/text-out path.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agentcore::agent_loop::history::History;
use agentcore::agent_loop::orchestrator::LlmOrchestrator;
use agentcore::agent_loop::{AgentLoop, Event, LoopOutcome};
use agentcore::intent::IntentRegistry;
use agentcore::registry::ExtensionRegistry;
use agentcore::tool::ToolResult;
use agentcore::Config;

static CANCELLED: AtomicBool = AtomicBool::new(false);

#[tokio::main]
async fn main() {
    agentcore::config::init_tracing();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    ctrlc::set_handler(|| {
        CANCELLED.store(true, Ordering::SeqCst);
        eprintln!("\ncancelling current turn...");
    })
    .expect("failed to install Ctrl-C handler");

    let registry = Arc::new(ExtensionRegistry::new());
    registry.discover_programs(&config);
    let no_providers: HashMap<String, agentcore::registry::ModuleEntryPoint> = HashMap::new();
    let _ = registry.discover_modules(Path::new(&config.modules_dir), &no_providers);

    let intents = Arc::new(IntentRegistry::new());
    register_builtin_intents(&intents);

    let orchestrator = Arc::new(LlmOrchestrator::new(config.clone()));
    let agent_loop = Arc::new(AgentLoop::new(
        registry,
        intents,
        orchestrator,
        config.max_iterations,
        false,
        false,
    ));

    let mut history = History::new();
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            print!("> ");
            let _ = io::stdout().flush();
            continue;
        }
        CANCELLED.store(false, Ordering::SeqCst);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let loop_handle = agent_loop.clone();
        let line_owned = line.clone();
        let mut history_for_run = std::mem::take(&mut history);
        let task = tokio::spawn(async move {
            let outcome = loop_handle.run(line_owned, &mut history_for_run, &tx).await;
            (outcome, history_for_run)
        });

        while let Some(event) = rx.recv().await {
            print_event(&event);
            if CANCELLED.load(Ordering::SeqCst) {
                task.abort();
                break;
            }
        }

        match task.await {
            Ok((Ok(LoopOutcome::Final(message)), restored)) => {
                println!("{message}");
                history = restored;
            }
            Ok((Ok(LoopOutcome::AwaitingApproval { tool_name, .. }), restored)) => {
                println!("[waiting for approval to run '{tool_name}' — not implemented in this demo]");
                history = restored;
            }
            Ok((Err(e), restored)) => {
                eprintln!("error: {e}");
                history = restored;
            }
            Err(_) => {
                println!("[cancelled]");
            }
        }

        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn print_event(event: &Event) {
    match event {
        Event::Status(s) => eprintln!("... {s}"),
        Event::ThoughtChunk(s) if !s.is_empty() => eprintln!("thinking: {s}"),
        Event::ThoughtChunk(_) => {}
        Event::CodeChunk(s) => eprintln!("acting: {s}"),
        Event::Screenshot { .. } => eprintln!("[screenshot captured]"),
        Event::Observation(result) => print_observation(result),
        Event::Final(_) => {}
    }
}

fn print_observation(result: &ToolResult) {
    if result.is_success() {
        if !result.output.is_empty() {
            eprintln!("observed: {}", result.output);
        }
    } else {
        eprintln!("observed error: {}", result.error);
    }
}

/// A couple of built-in intents wired directly to closures, the way
/// `butler/core/legacy_commands.py` wires its always-on commands without
/// any on-disk discovery step.
fn register_builtin_intents(intents: &IntentRegistry) {
    intents.register(
        "greet",
        "say hello or greet the assistant",
        false,
        Arc::new(|_, _| Ok(ToolResult::ok("Hello! How can I help?"))),
    );
    intents.register(
        "exit",
        "quit or exit the program",
        false,
        Arc::new(|_, _| Ok(ToolResult::ok("Goodbye."))),
    );
}
