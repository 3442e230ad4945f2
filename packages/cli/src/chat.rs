//! Terminal chat session.
//!
//! Keeps the transcript in memory for the life of the session and runs one
//! agent turn per line of input. After a turn that queried the feed the map
//! layers for the transcript are summarised below the answer.

use dialoguer::Input;
use quake_map_ai::agent::run_turn;
use quake_map_ai::providers::create_provider_from_env;
use quake_map_conversation::{Transcript, format_transcript};
use quake_map_feed::{FeedConfig, UsgsFeed, today_utc};
use quake_map_fusion::MapLayers;
use quake_map_risk::{RiskConfig, RiskProxy};

use crate::report;

/// In-session commands. Anything else is sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    Transcript,
    Map,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line {
            "/quit" | "/exit" => Some(Self::Quit),
            "/transcript" => Some(Self::Transcript),
            "/map" => Some(Self::Map),
            _ => None,
        }
    }
}

/// Runs the chat loop until the user types `/quit`.
///
/// # Errors
///
/// Returns an error if no AI provider is configured, an HTTP client cannot
/// be built, or reading from the terminal fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let provider = create_provider_from_env()?;
    let feed = UsgsFeed::new(FeedConfig::from_env())?;
    let risk = RiskProxy::new(RiskConfig::from_env())?;

    println!("Quake Map chat via {}", provider.label());
    println!("Commands: /map, /transcript, /quit");
    println!();

    let mut transcript = Transcript::default();

    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match Command::parse(line) {
            Some(Command::Quit) => break,
            Some(Command::Transcript) => {
                print!("{}", format_transcript(&transcript));
                continue;
            }
            Some(Command::Map) => {
                print_map(&risk, &transcript).await;
                continue;
            }
            None if line.is_empty() => continue,
            None => {}
        }

        let outcome = run_turn(provider.as_ref(), &feed, &transcript, line, today_utc()).await;
        transcript = outcome.transcript;

        if !outcome.answer.is_empty() {
            println!();
            println!("{}", outcome.answer);
            println!();
        }
        if let Err(e) = &outcome.result {
            eprintln!("(turn ended early: {e})");
        }

        let queried = transcript
            .turns()
            .last()
            .is_some_and(|turn| !turn.tool_invocations().is_empty());
        if queried {
            print_map(&risk, &transcript).await;
        }
    }

    log::debug!("Chat ended after {} turn(s)", transcript.len());
    Ok(())
}

async fn print_map(risk: &RiskProxy, transcript: &Transcript) {
    let Some(invocation) = transcript.latest_earthquake_invocation() else {
        println!("No earthquake query yet.");
        return;
    };

    let region = transcript.risk_region();
    let overlay = risk.fetch(Some(region.as_ref())).await;
    let layers = MapLayers::fuse(invocation.features(), Some(&overlay.body));

    print!("{}", report::format_earthquakes(&invocation.args, &layers));
    println!("{} risk cell(s) for {region}", layers.risk_cells.len());
    if let Some(e) = layers.risk_error() {
        println!("risk overlay unavailable: {e}");
    }
    println!();
}
