use std::io::Read;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use quorum_agents::ReportAssembler;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quorum", about = "Multi-agent investment decisions for crypto markets")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/quorum.toml")]
    config: String,

    /// Read MarketDataPackage JSON from a file instead of stdin
    #[arg(short, long)]
    input: Option<String>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    /// Save the report to the store configured under [store]
    #[arg(long)]
    persist: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // A missing .env is fine; keys may already be exported.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = quorum::load_config(&cli.config)?;

    let package_json = if let Some(input_path) = &cli.input {
        std::fs::read_to_string(input_path)
            .with_context(|| format!("Failed to read input: {input_path}"))?
    } else {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };
    let package = quorum::parse_package(&package_json)?;

    let store = if cli.persist {
        let store = quorum::open_store(&config)?;
        anyhow::ensure!(store.is_some(), "--persist requires a [store] section in the config");
        store
    } else {
        None
    };

    let pipeline = quorum::build_pipeline(&config)?;
    let report = quorum::analyze(&pipeline, package, store.as_ref()).await;

    // Output report as JSON to stdout
    let output = ReportAssembler
        .render(&report, cli.pretty)
        .context("Failed to serialize report")?;
    println!("{output}");

    Ok(if report.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
