//! flowweave core library for flow reconstruction from capture field exports.
//!
//! This crate implements the reconstruction pipeline used by the CLI:
//! record sources feed the analysis layer, which groups packet records by
//! flow key, splits each group at idle gaps and reduces every segment to
//! one row of a deterministic report. Cell conventions of the export
//! format are captured in readers so parsers stay minimal; all I/O is
//! isolated in `source` and `sink` modules.
//!
//! Invariants:
//! - Report and table outputs are deterministic and stable across runs.
//! - A flow's segments partition its records; segmentation never drops or
//!   duplicates a record.
//! - An idle gap splits a flow only when strictly greater than the
//!   threshold.
//!
//! Version française (résumé):
//! Cette crate fournit le cœur de reconstruction de flux : sources ->
//! regroupement par clé -> segmentation par inactivité -> agrégation ->
//! table déterministe. Les E/S restent dans `source` et `sink`, les
//! conventions du format d'export dans les `reader`. Garanties : ordre
//! stable des sorties, partition exacte des enregistrements, coupure
//! uniquement au-delà strict du seuil d'inactivité.
//!
//! # Examples
//! ```no_run
//! use std::path::Path;
//!
//! use flowweave_core::{EngineConfig, analyze_export_file};
//!
//! let report = analyze_export_file(Path::new("flows_raw.csv"), &EngineConfig::default())?;
//! println!("flow rows: {}", report.flows.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod analysis;
mod live;
mod sink;
mod source;

pub use analysis::{AnalysisError, analyze_export_file, analyze_source};
pub use live::LiveSegmenter;
pub use sink::{FLOW_TABLE_HEADER, SinkError, render_flow_table, write_flow_table};
pub use source::{ExportFileSource, PacketRecord, Ports, RecordSource, SourceError};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;
/// Default timestamp used when no capture time is available.
pub const DEFAULT_GENERATED_AT: &str = "1970-01-01T00:00:00Z";
/// Default idle gap, in seconds, that closes a flow segment.
pub const DEFAULT_IDLE_TIMEOUT_S: f64 = 30.0;
/// Default minimum records for a flow group to produce output.
pub const DEFAULT_MIN_PACKETS: usize = 2;

/// Shape of the flow key records are grouped under.
///
/// # Examples
/// ```
/// use flowweave_core::KeyShape;
///
/// let shape = KeyShape::default();
/// assert!(shape.bidirectional);
/// assert!(shape.include_ports);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShape {
    /// Fold both directions of a conversation into one flow.
    pub bidirectional: bool,
    /// Include transport ports in the key.
    pub include_ports: bool,
}

impl Default for KeyShape {
    fn default() -> Self {
        KeyShape {
            bidirectional: true,
            include_ports: true,
        }
    }
}

/// Engine parameters, passed explicitly into every pipeline stage.
///
/// # Examples
/// ```
/// use flowweave_core::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.idle_timeout_s, 30.0);
/// assert_eq!(config.min_packets, 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Idle gap in seconds that closes a flow segment (strict).
    pub idle_timeout_s: f64,
    /// Minimum records for a flow group to produce output.
    pub min_packets: usize,
    /// Flow key shape.
    pub key_shape: KeyShape,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            idle_timeout_s: DEFAULT_IDLE_TIMEOUT_S,
            min_packets: DEFAULT_MIN_PACKETS,
            key_shape: KeyShape::default(),
        }
    }
}

/// Aggregated flow report with deterministic ordering.
///
/// # Examples
/// ```
/// use flowweave_core::{EngineConfig, make_stub_report};
///
/// let report = make_stub_report("flows_raw.csv", 123, EngineConfig::default());
/// assert_eq!(report.report_version, flowweave_core::REPORT_VERSION);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    /// Report schema version (not the binary version).
    pub report_version: u32,
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// RFC3339 timestamp representing the report generation time.
    pub generated_at: String,

    /// Input export metadata.
    pub input: InputInfo,
    /// Parameters the engine ran with.
    pub config: EngineConfig,

    /// Optional capture summary (may be empty when unavailable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_summary: Option<CaptureSummary>,
    /// Flow rows in stable order, one per closed segment.
    pub flows: Vec<FlowSummary>,
}

/// Tool metadata embedded in reports.
///
/// # Examples
/// ```
/// use flowweave_core::ToolInfo;
///
/// let tool = ToolInfo {
///     name: "flowweave".to_string(),
///     version: "0.1.0".to_string(),
/// };
/// assert_eq!(tool.name, "flowweave");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (e.g., "flowweave").
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Input export metadata embedded in reports.
///
/// # Examples
/// ```
/// use flowweave_core::InputInfo;
///
/// let input = InputInfo {
///     path: "flows_raw.csv".to_string(),
///     bytes: 1024,
/// };
/// assert_eq!(input.bytes, 1024);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    /// Input path as provided to the analyzer.
    pub path: String,
    /// Input size in bytes.
    pub bytes: u64,
}

/// Basic capture summary (timestamps may be absent).
///
/// # Examples
/// ```
/// use flowweave_core::CaptureSummary;
///
/// let summary = CaptureSummary {
///     records_total: 10,
///     records_skipped: 1,
///     time_start: None,
///     time_end: None,
/// };
/// assert_eq!(summary.records_total, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSummary {
    /// Packet records accepted from the export.
    pub records_total: u64,
    /// Input rows rejected during parsing.
    pub records_skipped: u64,
    /// RFC3339 timestamp of the first record (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<String>,
    /// RFC3339 timestamp of the last record (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<String>,
}

/// One output row: a closed segment of a flow, reduced to features.
///
/// Field order is the column order of the CSV table, so every field is
/// always serialized; absent ports become empty cells (JSON `null`).
///
/// # Examples
/// ```
/// use flowweave_core::FlowSummary;
///
/// let flow = FlowSummary {
///     src_addr: "10.0.0.1".to_string(),
///     dst_addr: "10.0.0.2".to_string(),
///     src_port: Some(443),
///     dst_port: Some(51000),
///     protocol: "TCP".to_string(),
///     packets_src: 2,
///     packets_dst: 1,
///     bytes_src: 3000,
///     bytes_dst: 400,
///     duration_s: 5.0,
///     iat_median_s: 2.5,
/// };
/// assert_eq!(flow.protocol, "TCP");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSummary {
    /// Nominal source address (the side that sent the flow's first record).
    pub src_addr: String,
    /// Nominal destination address.
    pub dst_addr: String,
    /// Nominal source port, when the key includes ports.
    pub src_port: Option<u16>,
    /// Nominal destination port, when the key includes ports.
    pub dst_port: Option<u16>,
    /// Canonical protocol label.
    pub protocol: String,
    /// Records sent by the nominal source side.
    pub packets_src: u64,
    /// Records sent by the other side.
    pub packets_dst: u64,
    /// Bytes sent by the nominal source side.
    pub bytes_src: u64,
    /// Bytes sent by the other side.
    pub bytes_dst: u64,
    /// Segment duration in seconds (last minus first timestamp).
    pub duration_s: f64,
    /// Median inter-arrival time in seconds, rounded to 5 decimals. The
    /// inter-arrival sequence starts with 0 by convention.
    pub iat_median_s: f64,
}

/// Build a stub report with base fields filled and no flow rows.
///
/// # Examples
/// ```
/// use flowweave_core::{EngineConfig, make_stub_report};
///
/// let report = make_stub_report("flows_raw.csv", 123, EngineConfig::default());
/// assert_eq!(report.report_version, flowweave_core::REPORT_VERSION);
/// assert!(report.flows.is_empty());
/// ```
pub fn make_stub_report(input_path: &str, input_bytes: u64, config: EngineConfig) -> FlowReport {
    FlowReport {
        report_version: REPORT_VERSION,
        tool: ToolInfo {
            name: "flowweave".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        generated_at: DEFAULT_GENERATED_AT.to_string(),
        input: InputInfo {
            path: input_path.to_string(),
            bytes: input_bytes,
        },
        config,
        capture_summary: None,
        flows: vec![],
    }
}
