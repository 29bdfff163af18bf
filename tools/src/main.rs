//! watch-runner: headless evaluation runner for Transfer Watch.
//!
//! Usage:
//!   watch-runner --input transfers.csv
//!   watch-runner --synthetic 40 --seed 12345 --json
//!   watch-runner --input march.jsonl --db cases.db --case smith-estate
//!
//! Settings precedence: defaults, then --settings FILE, then the
//! LARGE_AMOUNT_THRESHOLD / TRANSFER_DAYS_WINDOW / TRANSFER_AMOUNT_TOLERANCE
//! environment variables.

use anyhow::{bail, Context, Result};
use std::{env, path::Path, str::FromStr};
use transfer_watch_core::{
    alert::AlertKind,
    config::DetectionConfig,
    engine::{Evaluation, WatchEngine},
    ingest,
    record::RawRecord,
    store::TransferStore,
    summary::{summarize, summarize_flows, FlowSummary, SenderSummary},
    synthetic::{SyntheticBatch, SyntheticProfile},
};

#[derive(serde::Serialize)]
struct Report<'a> {
    case: Option<&'a str>,
    evaluation_id: Option<String>,
    config: &'a DetectionConfig,
    alerts: &'a [transfer_watch_core::Alert],
    rejections: &'a [transfer_watch_core::Rejection],
    senders: Vec<SenderSummary>,
    flows: Vec<FlowSummary>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let input = arg_value(&args, "--input");
    let synthetic = parse_flag::<usize>(&args, "--synthetic")?;
    let seed = parse_flag(&args, "--seed")?.unwrap_or(42u64);
    let workers = parse_flag(&args, "--workers")?.unwrap_or(1usize);
    let settings = arg_value(&args, "--settings");
    let db = arg_value(&args, "--db");
    let case = arg_value(&args, "--case");
    let json_output = args.iter().any(|a| a == "--json");

    let config = resolve_config(settings)?;
    let engine = WatchEngine::new(config.clone())
        .context("detection settings rejected")?
        .with_workers(workers);

    let rows: Vec<RawRecord> = match (input, synthetic) {
        (Some(path), None) => ingest::read_path(Path::new(path))
            .with_context(|| format!("cannot read {path}"))?,
        (None, Some(senders)) => {
            let profile = SyntheticProfile {
                background_senders: senders,
                ..SyntheticProfile::default()
            };
            SyntheticBatch::generate(seed, &profile, &config).rows
        }
        (None, None) if db.is_some() => Vec::new(),
        _ => bail!("give exactly one of --input FILE or --synthetic N"),
    };

    let (evaluation, evaluation_id) = match (db, case) {
        (Some(db), Some(case)) => {
            let store = TransferStore::open(db)?;
            store.migrate()?;
            store.ensure_case(case)?;

            // Validate the new rows, keep them, then evaluate the whole case.
            let incoming = engine.evaluate(&rows);
            let inserted = store.upsert_records(case, &incoming.records)?;
            log::info!("Case {case}: {inserted} new records stored");

            let history = store.records_for_case(case)?;
            let alerts = engine.evaluate_records(&history);
            let evaluation = Evaluation {
                alerts,
                rejections: incoming.rejections,
                records: history,
            };
            let id = store.save_evaluation(case, &config, &evaluation)?;
            (evaluation, Some(id))
        }
        (Some(_), None) | (None, Some(_)) => bail!("--db and --case must be given together"),
        (None, None) => (engine.evaluate(&rows), None),
    };

    let senders = summarize(&evaluation.records, &evaluation.alerts);
    let flows = summarize_flows(&evaluation.records);
    if json_output {
        let report = Report {
            case,
            evaluation_id,
            config: &config,
            alerts: &evaluation.alerts,
            rejections: &evaluation.rejections,
            senders,
            flows,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&config, &evaluation, &senders, &flows, case, evaluation_id.as_deref());
    }

    Ok(())
}

/// Defaults, then the settings file, then the environment.
fn resolve_config(settings: Option<&str>) -> Result<DetectionConfig> {
    let mut config = DetectionConfig::default();
    if let Some(path) = settings {
        config = DetectionConfig::load(config, Path::new(path))?;
    }
    let config = config
        .overlay(|key| env::var(key).ok())
        .context("invalid detection setting in environment")?;
    Ok(config)
}

fn print_summary(
    config: &DetectionConfig,
    evaluation: &Evaluation,
    senders: &[SenderSummary],
    flows: &[FlowSummary],
    case: Option<&str>,
    evaluation_id: Option<&str>,
) {
    println!("Transfer Watch - watch-runner");
    if let Some(case) = case {
        println!("  case:        {case}");
    }
    if let Some(id) = evaluation_id {
        println!("  evaluation:  {id}");
    }
    println!("  threshold:   {}", config.large_amount_threshold);
    println!("  window:      {} day(s)", config.transfer_days_window);
    println!("  tolerance:   {}", config.transfer_amount_tolerance);
    println!();

    println!("=== EVALUATION SUMMARY ===");
    println!("  records:         {}", evaluation.records.len());
    println!("  rejections:      {}", evaluation.rejections.len());
    println!("  large transfers: {}", evaluation.count_of(AlertKind::SingleLargeTransfer));
    println!("  structuring:     {}", evaluation.count_of(AlertKind::StructuredTransfers));

    if !evaluation.alerts.is_empty() {
        println!();
        println!("=== ALERTS ===");
        for alert in &evaluation.alerts {
            println!(
                "  [{}] {} | {} | {}",
                alert.kind.label(),
                alert.subject_id,
                alert.total_amount,
                alert.description
            );
            println!("      records: {}", alert.contributing_records.join(", "));
        }
    }

    if !evaluation.rejections.is_empty() {
        println!();
        println!("=== REJECTED ROWS ===");
        for rejection in &evaluation.rejections {
            println!(
                "  row {} ({}): {}",
                rejection.index,
                rejection.record_id.as_deref().unwrap_or("-"),
                rejection.reason
            );
        }
    }

    let flagged: Vec<&SenderSummary> = senders.iter().filter(|s| s.alert_count() > 0).collect();
    if !flagged.is_empty() {
        println!();
        println!("=== FLAGGED SENDERS ===");
        for s in &flagged {
            println!(
                "  {} | {} transfers | total {} | {} to {} | alerts {}",
                s.sender_id,
                s.transfer_count,
                s.total_amount,
                s.first_transfer.date(),
                s.last_transfer.date(),
                s.alert_count()
            );
        }

        // Fund movement out of the flagged senders only.
        println!();
        println!("=== OUTGOING FLOWS OF FLAGGED SENDERS ===");
        for flow in flows
            .iter()
            .filter(|f| flagged.iter().any(|s| s.sender_id == f.sender_id))
        {
            println!(
                "  {} -> {} | {} transfers | total {}",
                flow.sender_id, flow.receiver_id, flow.transfer_count, flow.total_amount
            );
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

/// `Ok(None)` when the flag is absent; an error when its value does not parse.
fn parse_flag<T>(args: &[String], flag: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    arg_value(args, flag)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("invalid value '{raw}' for {flag}"))
        })
        .transpose()
}
