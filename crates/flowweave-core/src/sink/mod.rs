//! Flow table output.
//!
//! Renders summaries as a comma-separated table with a fixed column
//! order, so downstream feature loaders can index columns positionally.
//! The header row is always present, even for an empty table.

use std::io::Write;

use thiserror::Error;

use crate::FlowSummary;

/// Column order of the flow table. Matches the field order of
/// `FlowSummary`.
pub const FLOW_TABLE_HEADER: [&str; 11] = [
    "src_addr",
    "dst_addr",
    "src_port",
    "dst_port",
    "protocol",
    "packets_src",
    "packets_dst",
    "bytes_src",
    "bytes_dst",
    "duration_s",
    "iat_median_s",
];

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("table write error: {0}")]
    Csv(#[from] csv::Error),
}

/// Write the flow table to any writer, header first.
pub fn write_flow_table<W: Write>(writer: W, flows: &[FlowSummary]) -> Result<(), SinkError> {
    let mut out = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    out.write_record(&FLOW_TABLE_HEADER)?;
    for flow in flows {
        out.serialize(flow)?;
    }
    out.flush()?;
    Ok(())
}

/// Render the flow table as a string.
pub fn render_flow_table(flows: &[FlowSummary]) -> Result<String, SinkError> {
    let mut buf = Vec::new();
    write_flow_table(&mut buf, flows)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
