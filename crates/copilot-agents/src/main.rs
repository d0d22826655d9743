use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use copilot_agents::{AgentConfig, Assistant, PipelineOutput, RunOutcome};
use routing::events::{EventKind, StreamEvent};
use routing::router::Strategy;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (defaults apply for anything it leaves out)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pin every request to one strategy: direct, basic_cot, full_cot, react, planner
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Print typed events (thinking, tool calls, plans) alongside the answer
    #[arg(long, default_value_t = false)]
    events: bool,

    /// Prompt to answer; reads a chat session from stdin when omitted
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only the answer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AgentConfig::load(args.config.as_deref())?;
    info!(
        base_url = %config.provider.base_url,
        model = %config.provider.model,
        strategy = ?args.strategy,
        "copilot starting"
    );

    let assistant = Assistant::from_config(&config).context("Failed to build assistant")?;
    assistant.set_override(args.strategy);

    if let Some(prompt) = args.prompt {
        let outcome = respond(&assistant, &prompt, args.events).await?;
        if !outcome.success {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        match text {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                assistant.reset_conversation();
                println!("(conversation cleared)");
                continue;
            }
            _ => {}
        }
        respond(&assistant, text, args.events).await?;
    }

    let metrics = assistant.metrics();
    eprintln!(
        "\n{} requests, {} succeeded ({:.0}%), {} errors recorded",
        metrics.total,
        metrics.succeeded,
        metrics.success_rate * 100.0,
        metrics.errors_recorded
    );
    for entry in &metrics.tallies {
        eprintln!("  {:<8} {:<10} {}", entry.tier, entry.strategy, entry.count);
    }
    Ok(())
}

/// Stream one request to the terminal; Ctrl-C cancels it.
async fn respond(assistant: &Assistant, text: &str, show_events: bool) -> Result<RunOutcome> {
    let mut handle = assistant.submit_in_conversation(text);
    let cancel = handle.cancel.clone();
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            output = handle.next() => match output {
                Some(PipelineOutput::Token(token)) => {
                    print!("{token}");
                    stdout.flush()?;
                }
                Some(PipelineOutput::Event(event)) => render(&event, show_events),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => cancel.cancel(),
        }
    }
    println!();

    let outcome = handle.join.await.context("request task failed")?;
    if outcome.success {
        assistant
            .session()
            .append_exchange(text, &outcome.final_text);
    }
    Ok(outcome)
}

fn render(event: &StreamEvent, show_events: bool) {
    match event.kind {
        // Already streamed as tokens
        EventKind::FinalAnswer => {}
        kind if kind == EventKind::Escalation || kind.is_terminal() => {
            eprintln!("\n[{}] {}", event.kind, event.content);
        }
        EventKind::ToolCall if show_events => {
            let name = event.tool_name.as_deref().unwrap_or("?");
            match &event.parameters {
                Some(params) => eprintln!("\n[tool_call] {name} {params}"),
                None => eprintln!("\n[tool_call] {name}"),
            }
        }
        _ if show_events => eprintln!("\n[{}] {}", event.kind, event.content),
        _ => {}
    }
}
