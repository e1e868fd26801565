//! Console implementations of the core's event sinks.

use std::io::Write;

use atelier_core::{ActionAlert, AlertSink, ClientSink, TurnPhase};
use atelier_providers::Usage;
use atelier_runtime::OutputReceiver;

/// Prints the relayed turn stream to stdout.
pub struct ConsoleSink;

impl ClientSink for ConsoleSink {
    fn on_text(&self, text: &str) {
        print!("{}", text);
        let _ = std::io::stdout().flush();
    }

    fn on_phase(&self, phase: TurnPhase) {
        match phase {
            TurnPhase::Summarizing => eprintln!("• summarizing conversation..."),
            TurnPhase::SelectingContext => eprintln!("• selecting context files..."),
            TurnPhase::Generating => eprintln!("• generating..."),
            TurnPhase::Continuing => eprintln!("• response truncated, continuing..."),
            TurnPhase::Complete => eprintln!("\n• done"),
            TurnPhase::Idle => {}
        }
    }

    fn on_usage(&self, usage: &Usage) {
        eprintln!(
            "• tokens: {} prompt, {} completion",
            usage.prompt_tokens, usage.completion_tokens
        );
    }
}

impl AlertSink for ConsoleSink {
    fn on_alert(&self, alert: &ActionAlert) {
        eprintln!("! {}: {}", alert.title, alert.description);
    }
}

impl OutputReceiver for ConsoleSink {
    fn on_output_line(&self, line: &str) {
        eprintln!("  | {}", line);
    }
}
