//! Jobguard CLI binary.
//!
//! LLM security gateway for job-posting analysis.
//!
//! # Commands
//!
//! - `scan` - Flag injection phrasing in a job description
//! - `token` - Issue security tokens
//! - `assemble` - Build an analysis prompt around a job description
//! - `validate` - Check an LLM response before it is used
//! - `patterns` - List the active pattern set

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jobguard::{
    security::{max_severity, CompiledPattern},
    validator::Expectation,
    Config, Gateway, ScanPrecision, SecurityToken, VERSION,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "jobguard")]
#[command(version = VERSION)]
#[command(about = "Jobguard - LLM security gateway for job-posting analysis", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/jobguard/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a job description for injection phrasing (advisory)
    Scan {
        /// Text to scan (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Match precision (strict, loose)
        #[arg(short, long)]
        precision: Option<ScanPrecision>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Issue security tokens
    Token {
        /// Number of tokens
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Assemble an analysis prompt around a job description
    Assemble {
        /// Job description (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Job identifier
        #[arg(short, long, default_value = "job-1")]
        job_id: String,

        /// Use this token instead of issuing one
        #[arg(short, long)]
        token: Option<String>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output as JSON (prompt, token, beacon count)
        #[arg(long)]
        json: bool,
    },

    /// Validate an LLM analysis response
    Validate {
        /// Response text (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Token of the batch; an echo of it is rejected
        #[arg(short, long)]
        token: Option<String>,

        /// Job identifiers the response must cover exactly (repeatable)
        #[arg(short, long = "expect")]
        expect: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the active pattern set
    Patterns {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Commands::Scan {
        precision: Some(precision),
        ..
    } = &cli.command
    {
        config.patterns.precision = *precision;
    }
    let gateway = Gateway::new(config)?;

    match cli.command {
        Commands::Scan {
            input, file, json, ..
        } => cmd_scan(&gateway, input, file, json),

        Commands::Token { count, json } => cmd_token(&gateway, count, json),

        Commands::Assemble {
            input,
            file,
            job_id,
            token,
            output,
            json,
        } => cmd_assemble(&gateway, input, file, &job_id, token, output, json),

        Commands::Validate {
            input,
            file,
            token,
            expect,
            json,
        } => cmd_validate(&gateway, input, file, token, &expect, json),

        Commands::Patterns { json } => cmd_patterns(&gateway, json),
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn cmd_scan(
    gateway: &Gateway,
    input: Option<String>,
    file: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<ExitCode> {
    let content = read_input(input, file)?;
    let events = gateway.scan(&content);

    if json_output {
        let output = json!({
            "flagged": !events.is_empty(),
            "max_severity": max_severity(&events),
            "events": events,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if events.is_empty() {
        println!("CLEAN");
    } else {
        println!("FLAGGED ({} matches)", events.len());
        println!();
        for event in &events {
            println!(
                "  - {} ({}) severity: {} at offset {}",
                event.pattern_label, event.category, event.severity, event.offset
            );
            println!("    {}", event.text_sample);
        }
    }

    // Detection is advisory; flagged text is not an error.
    Ok(ExitCode::SUCCESS)
}

fn cmd_token(gateway: &Gateway, count: usize, json_output: bool) -> anyhow::Result<ExitCode> {
    let tokens: Vec<SecurityToken> = (0..count).map(|_| gateway.issue_token()).collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
    } else {
        for token in &tokens {
            println!("{token}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_assemble(
    gateway: &Gateway,
    input: Option<String>,
    file: Option<PathBuf>,
    job_id: &str,
    token: Option<String>,
    output: Option<PathBuf>,
    json_output: bool,
) -> anyhow::Result<ExitCode> {
    let content = read_input(input, file)?;
    let token = match token {
        Some(value) => SecurityToken::parse(value, &gateway.config().token)?,
        None => gateway.issue_token(),
    };

    let events = gateway.scan(&content);
    if !events.is_empty() {
        eprintln!(
            "warning: {} injection pattern(s) matched in {job_id}; text is passed through unchanged",
            events.len()
        );
    }

    let prompt = gateway.assemble(&content, &token, job_id);

    if json_output {
        let value = json!({
            "job_id": job_id,
            "token": token,
            "beacons": prompt.beacon_count(),
            "token_occurrences": prompt.token_occurrences(),
            "detections": events,
            "prompt": prompt.as_str(),
        });
        write_output(output, &serde_json::to_string_pretty(&value)?)?;
    } else {
        write_output(output, prompt.as_str())?;
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(
    gateway: &Gateway,
    input: Option<String>,
    file: Option<PathBuf>,
    token: Option<String>,
    expect: &[String],
    json_output: bool,
) -> anyhow::Result<ExitCode> {
    let content = read_input(input, file)?;
    let token = token
        .map(|value| SecurityToken::parse(value, &gateway.config().token))
        .transpose()?;

    let expectation = Expectation {
        batch_id: None,
        token: token.as_ref(),
        job_ids: (!expect.is_empty()).then_some(expect),
    };

    match gateway.validate_with(&content, expectation) {
        Ok(result) => {
            if json_output {
                let output = json!({ "accepted": true, "analysis": result });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("ACCEPTED ({} jobs)", result.len());
                for (job_id, analysis) in result.iter() {
                    println!(
                        "  - {job_id}: {} (authentic: {}, confidence: {})",
                        analysis.industry_classification.primary_industry,
                        analysis.authenticity_check.is_authentic,
                        analysis.authenticity_check.confidence_score,
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        },
        Err(rejection) => {
            if json_output {
                let output = json!({
                    "accepted": false,
                    "severity": rejection.severity(),
                    "error": rejection,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("REJECTED [{}] {rejection}", rejection.severity());
            }
            Ok(ExitCode::FAILURE)
        },
    }
}

fn cmd_patterns(gateway: &Gateway, json_output: bool) -> anyhow::Result<ExitCode> {
    let patterns = gateway.patterns();

    if json_output {
        let pick = |list: &[CompiledPattern]| list.iter().map(|p| p.pattern.clone()).collect::<Vec<_>>();
        let output = json!({
            "version": patterns.version(),
            "input": pick(patterns.input()),
            "output": pick(patterns.output()),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Pattern set {}", patterns.version());
    for (title, list) in [("Input", patterns.input()), ("Output", patterns.output())] {
        println!();
        println!("{title} ({}):", list.len());
        for compiled in list {
            let p = &compiled.pattern;
            println!(
                "  {:<28} {:<8} {:<14} {:?}",
                p.label,
                p.severity.to_string(),
                p.category.to_string(),
                p.tier
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

fn write_output(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}
