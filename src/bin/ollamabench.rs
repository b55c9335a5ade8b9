use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use ollamabench_rs::{
    run_benchmark, select_models, ConcurrencyMode, ErrorFilter, ModelInfo, OllamaClient,
    OllamaConfig, RunConfig, RunReport, TaskOutcome, DEFAULT_HOST,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROMPT: &str = "Briefly explain plate tectonics in one paragraph suitable for a \
general audience, highlighting causes and why it matters for Earth's geography.";

#[derive(Parser, Debug)]
#[command(
    name = "ollamabench",
    about = "Benchmark generative text models served by Ollama",
    version
)]
struct Cli {
    /// Enable verbose logging (repeat for more: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable coloured output (also honoured via NO_COLOR).
    #[arg(long, global = true)]
    no_color: bool,

    /// Ollama host URL; falls back to OLLAMA_HOST, then the local default.
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List models available on the server.
    ListModels {
        #[arg(long, value_enum, default_value_t = PrintFormat::Pretty)]
        print_format: PrintFormat,
    },

    /// Generate from MODEL using PROMPT and print the raw response.
    Generate {
        model: String,
        prompt: String,

        /// Request timeout in seconds
        #[arg(long, default_value_t = 120.0)]
        timeout: f64,
    },

    /// Send every prompt to every selected model and report timings.
    Benchmark(BenchmarkArgs),
}

#[derive(clap::Args, Debug)]
struct BenchmarkArgs {
    /// Prompt text to send to each model (repeatable)
    #[arg(long = "prompt")]
    prompts: Vec<String>,

    /// File whose whole contents form one prompt (repeatable)
    #[arg(long = "prompt-file")]
    prompt_files: Vec<PathBuf>,

    /// Model(s) to benchmark; defaults to every model on the server
    #[arg(short = 'm', long = "model")]
    models: Vec<String>,

    /// Maximum number of in-flight requests
    #[arg(short = 'c', long = "concurrent", default_value_t = 1)]
    concurrency: usize,

    /// Whether the limit applies to each model's batch or to all tasks
    #[arg(long, default_value_t = ConcurrencyMode::PerModel)]
    concurrency_mode: ConcurrencyMode,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30.0)]
    timeout: f64,

    /// Include the full response text in the output
    #[arg(short = 'r', long = "response")]
    response: bool,

    /// Only report failed tasks
    #[arg(long, conflicts_with = "no_errors")]
    errors_only: bool,

    /// Leave failed tasks out of the output
    #[arg(long)]
    no_errors: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PrintFormat {
    Pretty,
    Compact,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        console::set_colors_enabled(false);
    }

    let host = cli
        .host
        .or_else(|| std::env::var("OLLAMA_HOST").ok())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let client = OllamaClient::new(OllamaConfig::try_new(&host)?)?;

    match cli.command {
        Command::ListModels { print_format } => {
            let models = client
                .list_models()
                .await
                .with_context(|| format!("failed to list models from {}", client.host()))?;
            print_models(&models, print_format);
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate {
            model,
            prompt,
            timeout,
        } => {
            let timeout = parse_timeout(timeout)?;
            let raw = client
                .generate(&model, &prompt, Some(timeout))
                .await
                .with_context(|| format!("generate failed for model {}", model))?;
            println!("{}", serde_json::to_string_pretty(&json!({ "raw": raw }))?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Benchmark(args) => benchmark(client, args).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_timeout(secs: f64) -> Result<Duration> {
    let timeout = Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("timeout must be a positive number of seconds, got {}", secs))?;
    if timeout.is_zero() {
        return Err(anyhow!("timeout must be greater than zero"));
    }
    Ok(timeout)
}

async fn benchmark(client: OllamaClient, args: BenchmarkArgs) -> Result<ExitCode> {
    let prompts = load_prompts(&args.prompts, &args.prompt_files).await?;

    let available = client
        .list_models()
        .await
        .with_context(|| format!("failed to list models from {}", client.host()))?;
    let models = select_models(&available, &args.models)?;

    let error_filter = if args.errors_only {
        ErrorFilter::Only
    } else if args.no_errors {
        ErrorFilter::Exclude
    } else {
        ErrorFilter::None
    };

    let config = RunConfig::try_new(
        prompts,
        models,
        args.concurrency,
        args.concurrency_mode,
        parse_timeout(args.timeout)?,
    )?
    .with_response(args.response)
    .with_error_filter(error_filter);

    let report = run_benchmark(config, Arc::new(client)).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }

    if report.has_failures() {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn load_prompts(texts: &[String], files: &[PathBuf]) -> Result<Vec<String>> {
    let mut prompts = texts.to_vec();
    for path in files {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("unable to read prompt file {}", path.display()))?;
        prompts.push(text);
    }

    if prompts.is_empty() {
        info!("no prompt supplied, using the default prompt");
        prompts.push(DEFAULT_PROMPT.to_string());
    }
    Ok(prompts)
}

fn print_models(models: &[ModelInfo], format: PrintFormat) {
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let ctx = |model: &ModelInfo| {
        model
            .context_length
            .map(|length| length.to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    match format {
        PrintFormat::Pretty => {
            for model in models {
                println!("{}", style(&model.name).green().bold());
                println!("  {} {}", style("size:").magenta(), or_dash(&model.size));
                println!(
                    "  {} {}  {} {}",
                    style("params:").yellow(),
                    or_dash(&model.parameter_size),
                    style("quant:").blue(),
                    or_dash(&model.quantization_level)
                );
                println!(
                    "  {} {}  {} {}",
                    style("family:").white(),
                    or_dash(&model.family),
                    style("ctx:").cyan(),
                    ctx(model)
                );
                println!();
            }
        }
        PrintFormat::Compact => {
            for (idx, model) in models.iter().enumerate() {
                println!(
                    "{} {}  {}  {}  {}  {} {}",
                    style(idx + 1).cyan(),
                    style(&model.name).green(),
                    style(or_dash(&model.size)).magenta(),
                    style(or_dash(&model.parameter_size)).yellow(),
                    style(or_dash(&model.quantization_level)).blue(),
                    or_dash(&model.family),
                    style(ctx(model)).cyan()
                );
            }
        }
    }
}

fn print_report(report: &RunReport) {
    for result in &report.results {
        let prompt = preview(&result.prompt, 48);
        match &result.outcome {
            TaskOutcome::Error { error } => {
                println!(
                    "{} {} after {:.3}s [{}]: {}",
                    style(&result.model).red().bold(),
                    style(&error.kind).red(),
                    result.elapsed.as_secs_f64(),
                    prompt,
                    error.message
                );
                println!();
            }
            TaskOutcome::Ok { metrics, response } => {
                println!("{}  {}", style(&result.model).green().bold(), style(prompt).dim());
                println!("  status: ok");
                println!("  elapsed: {:.3}s", result.elapsed.as_secs_f64());
                println!("  prompt rate: {} tokens/s", format_rate(metrics.prompt_tokens_per_sec));
                println!(
                    "  response rate: {} tokens/s",
                    format_rate(metrics.response_tokens_per_sec)
                );
                if let Some(text) = response {
                    println!("  response: {}", text.trim());
                }
                println!();
            }
        }
    }

    let summary = &report.summary;
    println!(
        "Total tasks: {} (success {}, failure {})",
        summary.attempted, summary.succeeded, summary.failed
    );
    for (kind, count) in &summary.failures_by_kind {
        println!("  {}: {}", kind, count);
    }
    for model in &summary.models {
        println!(
            "{}: p50={} p90={} p99={} mean response rate={} tokens/s",
            style(&model.model).bold(),
            format_secs(model.latency_p50_secs),
            format_secs(model.latency_p90_secs),
            format_secs(model.latency_p99_secs),
            format_rate(model.mean_response_tokens_per_sec)
        );
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let cut: String = single_line.chars().take(max_chars).collect();
    format!("{}…", cut)
}

fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(value) => format!("{:.2}", value),
        None => "n/a".to_string(),
    }
}

fn format_secs(secs: Option<f64>) -> String {
    match secs {
        Some(value) => format!("{:.3}s", value),
        None => "n/a".to_string(),
    }
}
