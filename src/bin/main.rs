//! One-shot command line agent
//!
//! Runs a single reasoning session and prints the answer between
//! `<Response>` and `</Response>`.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use wealth_advisor::{
    agent::{LoopConfig, ReasoningLoop},
    config::AppConfig,
    gemini::GeminiClient,
    market::YahooMarketData,
    tools::create_default_registry,
};

#[derive(Parser, Debug)]
#[command(name = "advisor")]
#[command(about = "Ask the financial advisor agent a question", long_about = None)]
struct Args {
    /// The question, e.g. Should I invest in Cipla pharmaceuticals?
    #[arg(required = true, num_args = 1..)]
    query: Vec<String>,

    /// Override AGENT_MAX_ITERATIONS
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print the full reasoning trace to stderr
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout only carries the answer
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let query = args.query.join(" ");

    let mut config = AppConfig::from_env()?;
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }

    let model = Arc::new(GeminiClient::from_config(&config)?);
    let tools = Arc::new(create_default_registry(
        &config,
        Arc::new(YahooMarketData::new()),
    )?);
    let agent = ReasoningLoop::new(model, tools, LoopConfig::from_config(&config));

    info!(query = %query, "Running agent");
    println!("Query: {}", query);

    let outcome = agent.run(&query).await?;

    if args.trace {
        eprintln!("{}", outcome.trace);
    }

    match outcome.answer {
        Some(answer) if outcome.is_complete() => {
            println!("<Response> {} </Response>", answer);
            Ok(())
        }
        _ => {
            eprintln!(
                "No final answer after {} iterations ({:?}, {} ms)",
                outcome.iterations, outcome.stop, outcome.elapsed_ms
            );
            std::process::exit(2);
        }
    }
}
