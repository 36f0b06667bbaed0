// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::env;
use std::fs;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use contract_lab::actions::{execution_templates, run_action};
use contract_lab::backends::stub::StubEngineLoader;
use contract_lab::backends::wasm::WasmEngineLoader;
use contract_lab::bridge::HostBridge;
use contract_lab::config::{load_config, Config, DeterminismConfig, DiffConfig};
use contract_lab::diagnostics::extract_diagnostics;
use contract_lab::diff::{diff_contracts, DiffKind};
use contract_lab::engine::{Pipeline, PipelineSnapshot, StageStatus, StepOutcome};
use contract_lab::traits::Operation;
use contract_lab::verifier::DeterminismVerifier;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "contract_lab=info";

/// Flags that apply to every command, plus the command words themselves.
struct CliArgs {
    config: Option<String>,
    stub: bool,
    step: bool,
    command: Vec<String>,
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli = CliArgs {
        config: None,
        stub: false,
        step: false,
        command: Vec::new(),
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().ok_or("--config needs a file path")?;
                cli.config = Some(path.clone());
            }
            "--stub" => cli.stub = true,
            "--step" => cli.step = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{}'", flag)),
            _ => cli.command.push(arg.clone()),
        }
    }
    Ok(cli)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--config <file.yaml>] [--stub] <command>", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  pipeline <contract> [--step]              Run parse → normalize → verify → hash");
    eprintln!("  run <action> <contract> [inputs.json]     Run one of: parse, normalize, verify, hash, execute");
    eprintln!("  diff <left> <right>                       Diff two contracts after normalizing both");
    eprintln!("  determinism <contract> [iterations]       Hash repeatedly and compare digests");
    eprintln!("  template <contract>                       Draft execute inputs for each declared operation");
    eprintln!();
    eprintln!("Example: {} pipeline contracts/hello-world.icl", program);
    eprintln!("Example: {} --stub run execute hello.icl inputs.json", program);
}

/// Wait for user to press Enter with a custom prompt
fn wait_for_keypress(prompt: &str) -> io::Result<()> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(())
}

fn read_source(path: &str) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path))
}

/// Pretty-print JSON payloads; anything else is shown as-is.
fn pretty(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| payload.to_string())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("contract-lab");

    let cli = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(cli) if !cli.command.is_empty() => cli,
        Ok(_) => {
            print_usage(program);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            print_usage(program);
            std::process::exit(1);
        }
    };

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("❌ {:#}", e);
            std::process::exit(2);
        }
    }
}

/// Returns whether the command's check passed.
async fn run(cli: CliArgs) -> anyhow::Result<bool> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let bridge = if cli.stub {
        HostBridge::new(Arc::new(StubEngineLoader))
    } else {
        HostBridge::new(Arc::new(WasmEngineLoader::from_config(&config.engine)))
    };

    let words: Vec<&str> = cli.command.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["pipeline", file] => run_pipeline(&bridge, file, cli.step).await,
        ["run", action, file] => run_single(&bridge, action, file, None).await,
        ["run", action, file, inputs] => run_single(&bridge, action, file, Some(*inputs)).await,
        ["diff", left, right] => run_diff(&bridge, left, right, &config.diff).await,
        ["determinism", file] => run_determinism(&bridge, &config.determinism, file, None).await,
        ["determinism", file, iterations] => {
            let iterations = iterations
                .parse()
                .with_context(|| format!("iterations must be a whole number, got '{}'", iterations))?;
            run_determinism(&bridge, &config.determinism, file, Some(iterations)).await
        }
        ["template", file] => run_template(&bridge, file).await,
        other => Err(anyhow!("unrecognized command: {}", other.join(" "))),
    }
}

fn print_snapshot(snapshot: &PipelineSnapshot) {
    for result in &snapshot.stages {
        let icon = match result.status {
            StageStatus::Success => "✅",
            StageStatus::Error => "❌",
            StageStatus::Running => "⏳",
            StageStatus::Pending => "⬜",
        };
        let timing = result
            .duration_ms
            .map(|ms| format!(" ({:.2}ms)", ms))
            .unwrap_or_default();
        println!("  {} {:<10} {}{}", icon, result.stage.as_str(), result.status, timing);
        if let Some(error) = &result.error {
            println!("     {}", error);
        }
    }
    if snapshot.is_complete && !snapshot.has_error {
        if let Some(hash) = snapshot.stages.last().and_then(|s| s.output.as_deref()) {
            println!("\n🔑 Semantic hash: {}", hash);
        }
    }
}

async fn run_pipeline(bridge: &HostBridge, file: &str, step: bool) -> anyhow::Result<bool> {
    let pipeline = Pipeline::new(bridge.clone());
    pipeline.reset(read_source(file)?)?;

    println!("🚀 Contract Pipeline");
    println!("═══════════════════════════════════");
    println!("Contract: {}", file);
    println!("Engine:   {}", bridge.describe());
    println!();

    if step {
        loop {
            let snapshot = pipeline.snapshot()?;
            if snapshot.is_complete || snapshot.has_error {
                break;
            }
            let next = snapshot.stages[snapshot.current_index].stage;
            wait_for_keypress(&format!("Press Enter to run '{}'... ", next))?;
            if let StepOutcome::Refused(reason) = pipeline.step_next().await? {
                println!("⏸️  {}", reason);
                break;
            }
            print_snapshot(&pipeline.snapshot()?);
            println!();
        }
    } else {
        let summary = pipeline.run_all().await?;
        println!("🔢 Stages executed: {}", summary.executed.len());
        println!();
    }

    let snapshot = pipeline.snapshot()?;
    print_snapshot(&snapshot);
    Ok(!snapshot.has_error)
}

async fn run_single(
    bridge: &HostBridge,
    action: &str,
    file: &str,
    inputs_file: Option<&str>,
) -> anyhow::Result<bool> {
    let action: Operation = action.parse().map_err(anyhow::Error::msg)?;
    let source = read_source(file)?;
    let inputs = inputs_file.map(read_source).transpose()?;

    let result = run_action(bridge, action, &source, inputs.as_deref()).await?;
    if result.success {
        println!("✅ {} succeeded in {:.2}ms", action, result.duration_ms);
        println!("{}", pretty(&result.output));
    } else {
        println!("❌ {} failed in {:.2}ms", action, result.duration_ms);
    }

    let diagnostics = extract_diagnostics(&result);
    if !diagnostics.is_empty() {
        println!("\n📍 Diagnostics:");
        for diagnostic in &diagnostics {
            let location = match (diagnostic.line, diagnostic.column) {
                (Some(line), Some(column)) => format!("{}:{}: ", line, column),
                (Some(line), None) => format!("{}: ", line),
                _ => String::new(),
            };
            println!("   • {}{}", location, diagnostic.message);
        }
    }

    Ok(result.success && diagnostics.is_empty())
}

async fn run_diff(bridge: &HostBridge, left: &str, right: &str, config: &DiffConfig) -> anyhow::Result<bool> {
    let report = diff_contracts(bridge, &read_source(left)?, &read_source(right)?, config).await?;

    println!("--- {}", left);
    println!("+++ {}", right);
    for line in &report.lines {
        let marker = match line.kind {
            DiffKind::Same => ' ',
            DiffKind::Added => '+',
            DiffKind::Removed => '-',
        };
        println!("{:>4} {}{}", line.sequence_number, marker, line.text);
    }
    println!(
        "\n📊 +{} added, -{} removed, {} unchanged",
        report.added, report.removed, report.unchanged
    );

    Ok(report.is_identical())
}

async fn run_determinism(
    bridge: &HostBridge,
    config: &DeterminismConfig,
    file: &str,
    iterations: Option<usize>,
) -> anyhow::Result<bool> {
    let iterations = iterations.unwrap_or_else(|| config.default_iterations());
    let verifier = DeterminismVerifier::from_config(bridge.clone(), config);
    let sample = verifier.run(&read_source(file)?, iterations).await?;

    if sample.all_identical {
        println!("✅ {} iterations, all digests identical", sample.iteration_count);
        if let Some(digest) = sample.hashes.first() {
            println!("   {}", digest);
        }
    } else {
        println!(
            "❌ {} iterations produced {} distinct digests",
            sample.iteration_count,
            sample.distinct()
        );
        for (i, digest) in sample.hashes.iter().enumerate() {
            println!("   {:>4}. {}", i + 1, digest);
        }
    }
    println!("⏱️  Total: {:.3}ms, average: {:.3}ms", sample.total_ms, sample.avg_ms);

    Ok(sample.all_identical)
}

async fn run_template(bridge: &HostBridge, file: &str) -> anyhow::Result<bool> {
    let templates = execution_templates(bridge, &read_source(file)?).await?;

    println!("📝 {} operation template(s) for {}", templates.len(), file);
    for template in &templates {
        println!("\n# {}", template.operation);
        println!("{}", template.render()?);
    }
    Ok(true)
}
