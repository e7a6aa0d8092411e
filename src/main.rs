use anyhow::{Context, Result};
use clap::Parser;
use codeprof::analyzer::{AnalysisBatch, AnalysisRequest, Analyzer};
use codeprof::cli::{Cli, OutputFormat};
use codeprof::config::{AnalyzerConfig, DEFAULT_CONFIG_FILE};
use codeprof::csv_output::CsvOutput;
use codeprof::history::{render_table, HistoryEntry, HistoryStore};
use codeprof::report::RunReport;
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber; `RUST_LOG` wins over the default level
fn init_tracing(verbose: bool) {
    let default = if verbose { "codeprof=debug" } else { "codeprof=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AnalyzerConfig> {
    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AnalyzerConfig::load_optional(Path::new(DEFAULT_CONFIG_FILE))
            .with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))?,
    };
    let mut config = config
        .with_env_overrides(|key| std::env::var(key).ok())
        .context("invalid environment override")?;

    if let Some(timeout) = cli.timeout {
        config.sandbox.timeout_secs = timeout;
    }
    if let Some(interval) = cli.interval_ms {
        config.sampler.interval_ms = interval;
    }
    if let Some(repeat) = cli.repeat {
        config.comparison.repeat = repeat;
    }
    if cli.no_suggest {
        config.suggestions.enabled = false;
    }
    if cli.no_history {
        config.history.enabled = false;
    }
    config.validate().context("invalid command-line option")?;
    Ok(config)
}

fn print_reports(batch: &AnalysisBatch, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for report in &batch.reports {
                println!("{}", report.to_text());
            }
        }
        OutputFormat::Json => {
            let run = RunReport::new(batch.reports.clone());
            println!("{}", run.to_json()?);
        }
    }
    for (path, err) in &batch.failures {
        eprintln!("codeprof: {}: {}", path.display(), err);
    }
    Ok(())
}

fn write_outputs(cli: &Cli, batch: &AnalysisBatch) -> Result<()> {
    if let Some(path) = &cli.output {
        let json = RunReport::new(batch.reports.clone()).to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }

    if let Some(path) = &cli.samples_csv {
        let mut csv = CsvOutput::new();
        for report in &batch.reports {
            let label = report.target.display_name();
            match &report.comparison {
                Some(comparison) => {
                    for result in [&comparison.baseline, &comparison.candidate] {
                        csv.add_series(&result.target.display_name(), &result.samples);
                    }
                }
                None => csv.add_series(&label, &report.result.samples),
            }
        }
        std::fs::write(path, csv.to_csv())
            .with_context(|| format!("failed to write samples {}", path.display()))?;
    }
    Ok(())
}

fn update_history(cli: &Cli, config: &AnalyzerConfig, batch: &AnalysisBatch) -> Result<()> {
    let store = HistoryStore::new(&config.history.path);

    if config.history.enabled {
        let entries: Vec<HistoryEntry> = batch
            .reports
            .iter()
            .map(|report| HistoryEntry::from_result(&report.result))
            .collect();
        store.append(&entries).context("failed to update history")?;
    }

    if cli.history {
        for report in &batch.reports {
            let path = report.target.path();
            let entries = store.entries_for(path).context("failed to read history")?;
            println!("{}", render_table(path, &entries));
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;

    let mut analyzer = Analyzer::new(&config).context("failed to build analyzer")?;
    if config.suggestions.enabled {
        analyzer = analyzer.with_ollama();
    }

    let batch = analyzer.analyze(&AnalysisRequest {
        targets: cli.targets.clone(),
        test: cli.test.clone(),
        compare: cli.compare.clone(),
        patterns: cli.patterns,
    });

    print_reports(&batch, cli.format)?;
    write_outputs(cli, &batch)?;
    update_history(cli, &config, &batch)?;

    if !batch.failures.is_empty() {
        return Ok(ExitCode::from(2));
    }
    Ok(if batch.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("codeprof: {err:#}");
            ExitCode::from(2)
        }
    }
}
