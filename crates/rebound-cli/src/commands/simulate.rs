use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rebound_core::RemoteError;
use rebound_engine::{
    BulkError, BulkOperationReport, BulkOrchestrator, CancellationToken, Config, Progress,
    Severity,
};

#[derive(Debug, clap::Args)]
pub struct SimulateArgs {
    /// Item IDs to process
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Make an item fail: <id>=<status>[:<code>]
    #[arg(long = "fail", value_name = "ID=STATUS[:CODE]", value_parser = parse_failure)]
    pub failures: Vec<SimulatedFailure>,

    /// Make an item's action panic
    #[arg(long = "panic", value_name = "ID")]
    pub panics: Vec<String>,

    /// Simulated latency of every remote call, in milliseconds
    #[arg(long, default_value_t = 50)]
    pub delay_ms: u64,

    /// Report complete failure as a warning and exit successfully
    #[arg(long)]
    pub ignore_partial_failures: bool,

    /// Maximum number of items in flight (overrides config)
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Deadline for the whole batch in seconds (overrides config)
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}

/// One `--fail` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFailure {
    pub id: String,
    pub status: u16,
    pub code: String,
}

fn parse_failure(s: &str) -> Result<SimulatedFailure, String> {
    let (id, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <id>=<status>[:<code>], got '{s}'"))?;
    if id.is_empty() {
        return Err(format!("missing item id in '{s}'"));
    }
    let (status, code) = rest.split_once(':').unwrap_or((rest, ""));
    let status = status
        .parse::<u16>()
        .map_err(|e| format!("invalid status '{status}': {e}"))?;

    Ok(SimulatedFailure {
        id: id.to_string(),
        status,
        code: code.to_string(),
    })
}

/// In-process stand-in for a remote API.
#[derive(Debug)]
struct SimulatedRemote {
    failures: HashMap<String, SimulatedFailure>,
    panics: HashSet<String>,
    delay: Duration,
}

impl SimulatedRemote {
    async fn call(&self, id: &str) -> Result<String, RemoteError> {
        tokio::time::sleep(self.delay).await;
        if self.panics.contains(id) {
            panic!("simulated crash while processing {id}");
        }
        match self.failures.get(id) {
            Some(failure) => Err(RemoteError::api(
                failure.status,
                failure.code.clone(),
                format!("simulated failure for {id}"),
            )),
            None => Ok(format!("{id}: ok")),
        }
    }
}

fn print_report(report: &BulkOperationReport<String>, ignore: bool) {
    let diagnostic = report.diagnostic(ignore);
    let marker = match diagnostic.severity {
        Severity::Info => "✓",
        Severity::Warning => "⚠",
        Severity::Error => "✗",
    };

    println!("\nItems:");
    for result in report.results() {
        match (result.value(), result.error()) {
            (Some(value), _) => println!("  ✓ {}", value),
            (None, Some(error)) => println!("  ✗ {}: {}", result.item_id(), error),
            (None, None) => {}
        }
    }

    println!("\n{} {} ({})", marker, diagnostic.summary, report.verdict());
    for line in diagnostic.detail.lines() {
        println!("  {}", line);
    }
    println!(
        "  operation {} took {:.2?}",
        report.operation_id(),
        report.elapsed()
    );
}

fn report_json(report: &BulkOperationReport<String>, ignore: bool) -> serde_json::Value {
    serde_json::json!({
        "verdict": report.verdict(),
        "diagnostic": report.diagnostic(ignore),
        "report": report,
    })
}

/// Run a bulk operation against the simulated remote.
pub async fn run_simulate(args: SimulateArgs, config: &Config) -> Result<()> {
    let mut options = config.orchestrator();
    if args.ignore_partial_failures {
        options = options.ignoring_partial_failures(true);
    }
    if let Some(max) = args.max_concurrency {
        options = options.with_max_concurrency(max);
    }
    if let Some(secs) = args.timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }
    let ignore = options.ignore_partial_failures;

    let remote = Arc::new(SimulatedRemote {
        failures: args
            .failures
            .into_iter()
            .map(|failure| (failure.id.clone(), failure))
            .collect(),
        panics: args.panics.into_iter().collect(),
        delay: Duration::from_millis(args.delay_ms),
    });

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; cancelling remaining items");
            on_interrupt.cancel();
        }
    });

    let json = args.json;
    let progress = move |p: Progress| {
        if !json {
            println!("  {}", p);
        }
    };

    let orchestrator = BulkOrchestrator::new(options);
    let result = orchestrator
        .run(
            args.ids,
            move |id| {
                let remote = Arc::clone(&remote);
                async move { remote.call(&id).await }
            },
            &progress,
            &cancel,
        )
        .await;

    match result {
        Ok(report) => {
            if json {
                let value = report_json(&report, ignore);
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).context("Failed to render report")?
                );
            } else {
                print_report(&report, ignore);
            }
            Ok(())
        }
        Err(err) if err.is_interrupted() => {
            Err(err).context("Bulk operation was interrupted before any item succeeded")
        }
        Err(err @ BulkError::CompleteFailure { .. }) => {
            Err(err).context("Bulk operation failed for every item")
        }
        Err(err) => Err(err).context("Bulk operation was rejected"),
    }
}
