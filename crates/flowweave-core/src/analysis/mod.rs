use std::path::Path;

use rayon::prelude::*;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::source::{ExportFileSource, PacketRecord, RecordSource, SourceError};
use crate::{
    CaptureSummary, DEFAULT_GENERATED_AT, EngineConfig, FlowReport, FlowSummary, make_stub_report,
};

pub(crate) mod group;
pub(crate) mod segment;
pub(crate) mod stats;

use group::build_flow_groups;
use segment::split_on_idle;
use stats::{sort_flows, summarize_segment};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

pub fn analyze_export_file(
    path: &Path,
    config: &EngineConfig,
) -> Result<FlowReport, AnalysisError> {
    let source = ExportFileSource::open(path)?;
    analyze_source(path, source, config)
}

pub fn analyze_source<S: RecordSource>(
    path: &Path,
    mut source: S,
    config: &EngineConfig,
) -> Result<FlowReport, AnalysisError> {
    let mut records: Vec<PacketRecord> = Vec::new();
    let mut first_ts = None;
    let mut last_ts = None;

    while let Some(record) = source.next_record()? {
        update_ts_bounds(&mut first_ts, &mut last_ts, record.ts);
        records.push(record);
    }
    let records_total = records.len() as u64;
    let records_skipped = source.skipped();

    let groups = build_flow_groups(records, config);
    let mut flows: Vec<FlowSummary> = groups
        .par_iter()
        .flat_map_iter(|group| {
            split_on_idle(&group.records, config.idle_timeout_s)
                .into_iter()
                .map(move |segment| summarize_segment(&group.endpoints, &segment))
        })
        .collect();
    sort_flows(&mut flows);

    log::info!(
        "{records_total} records in {} groups -> {} rows ({records_skipped} skipped)",
        groups.len(),
        flows.len()
    );

    let mut report = make_stub_report(
        &path.display().to_string(),
        path.metadata()?.len(),
        *config,
    );
    report.capture_summary = Some(CaptureSummary {
        records_total,
        records_skipped,
        time_start: ts_to_rfc3339(first_ts),
        time_end: ts_to_rfc3339(last_ts),
    });
    report.generated_at = report
        .capture_summary
        .as_ref()
        .and_then(|summary| summary.time_end.clone().or(summary.time_start.clone()))
        .unwrap_or_else(|| DEFAULT_GENERATED_AT.to_string());
    report.flows = flows;
    Ok(report)
}

fn update_ts_bounds(first: &mut Option<f64>, last: &mut Option<f64>, ts: f64) {
    match first {
        None => *first = Some(ts),
        Some(existing) => {
            if ts < *existing {
                *first = Some(ts);
            }
        }
    }
    match last {
        None => *last = Some(ts),
        Some(existing) => {
            if ts > *existing {
                *last = Some(ts);
            }
        }
    }
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    let nanos = (ts * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
