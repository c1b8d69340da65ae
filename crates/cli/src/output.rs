use crate::error::CliError;
use engine_core::state::models::RunState;
use model::outcome::{MappingOutcome, RunReport};
use std::collections::BTreeMap;

/// One terse line per mapping plus a totals line; details live in the log.
pub fn print_report(report: &RunReport) {
    for (mapping_id, outcome) in &report.outcomes {
        println!("{mapping_id:<24} {outcome}");
    }

    let total = report.outcomes.len();
    let failed = report.failed_count();
    let records: u64 = report
        .outcomes
        .values()
        .map(|outcome| match outcome {
            MappingOutcome::Succeeded { records, .. } => *records,
            _ => 0,
        })
        .sum();
    println!("{total} mapping(s), {} ok, {failed} failed, {records} records", total - failed);
}

pub fn print_status(states: &BTreeMap<String, RunState>, as_json: bool) -> Result<(), CliError> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(states)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("No sync state recorded yet.");
        return Ok(());
    }

    println!(
        "{:<24} {:<24} {:<26} {:>12}  {}",
        "Mapping", "Watermark", "Last success", "Records", "Last error"
    );
    for (mapping_id, state) in states {
        let watermark = if state.watermark.is_empty() {
            "-".to_string()
        } else {
            state.watermark.to_string()
        };
        let last_success = state
            .last_success_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<24} {:<24} {:<26} {:>12}  {}",
            mapping_id,
            watermark,
            last_success,
            state.records_uploaded_total,
            state.last_error.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
