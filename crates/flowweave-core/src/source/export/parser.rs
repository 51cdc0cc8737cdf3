use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::source::{PacketRecord, RecordSource, SourceError};

use super::error::RowError;
use super::layout;
use super::reader::{decode_addr, parse_frame_len, parse_timestamp, protocol_label, resolve_ports};

/// Streaming record source over a capture field export file.
///
/// Rows that cannot form a `PacketRecord` are logged at `warn` with their
/// line number and skipped; only I/O failures abort iteration.
pub struct ExportFileSource {
    reader: BufReader<File>,
    line: Vec<u8>,
    line_no: u64,
    skipped: u64,
}

impl ExportFileSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(SourceError::from)?;
        Ok(Self {
            reader: BufReader::new(file),
            line: Vec::new(),
            line_no: 0,
            skipped: 0,
        })
    }
}

impl RecordSource for ExportFileSource {
    fn next_record(&mut self) -> Result<Option<PacketRecord>, SourceError> {
        loop {
            self.line.clear();
            let read = self.reader.read_until(b'\n', &mut self.line)?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let text = String::from_utf8_lossy(&self.line);
            let row = text.trim_end_matches(['\n', '\r']);
            // Blank lines, including the final newline, are not rows.
            if row.is_empty() {
                continue;
            }
            match parse_row(row) {
                Ok(record) => return Ok(Some(record)),
                Err(err) => {
                    self.skipped += 1;
                    log::warn!("skipping export line {}: {}", self.line_no, err);
                }
            }
        }
    }

    fn skipped(&self) -> u64 {
        self.skipped
    }
}

/// Convert one export row into a `PacketRecord`.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use flowweave_core::source::export::parser::parse_row;
///
/// let record = parse_row("1716119981.5,2130706433,16843009,443,51000,,,6,1500").unwrap();
/// assert_eq!(record.src_addr, "127.0.0.1");
/// assert_eq!(record.protocol, "TCP");
/// ```
///
/// # Errors
/// Returns `RowError` when the column count, timestamp or frame length
/// cell cannot be used; address and protocol cells never reject a row.
pub fn parse_row(row: &str) -> Result<PacketRecord, RowError> {
    let cells: Vec<&str> = row.split(layout::SEPARATOR).collect();
    if cells.len() != layout::COLUMN_COUNT {
        return Err(RowError::ColumnCount {
            expected: layout::COLUMN_COUNT,
            found: cells.len(),
        });
    }

    let ts = parse_timestamp(cells[layout::TIMESTAMP_IDX])?;
    let frame_len = parse_frame_len(cells[layout::FRAME_LEN_IDX])?;

    Ok(PacketRecord {
        ts,
        src_addr: decode_addr(cells[layout::SRC_ADDR_IDX]),
        dst_addr: decode_addr(cells[layout::DST_ADDR_IDX]),
        ports: resolve_ports(
            cells[layout::TCP_SRC_PORT_IDX],
            cells[layout::TCP_DST_PORT_IDX],
            cells[layout::UDP_SRC_PORT_IDX],
            cells[layout::UDP_DST_PORT_IDX],
        ),
        protocol: protocol_label(cells[layout::PROTOCOL_IDX]),
        frame_len,
    })
}

#[cfg(test)]
mod tests {
    use super::parse_row;
    use crate::source::Ports;
    use crate::source::export::error::RowError;
    use crate::source::export::layout;

    #[test]
    fn parse_tcp_row() {
        let record = parse_row("1716119981.5,2130706433,16843009,443,51000,,,6,1500").unwrap();
        assert!((record.ts - 1716119981.5).abs() < 1e-9);
        assert_eq!(record.src_addr, "127.0.0.1");
        assert_eq!(record.dst_addr, "1.1.1.1");
        assert_eq!(record.ports, Ports::Tcp { src: 443, dst: 51000 });
        assert_eq!(record.protocol, "TCP");
        assert_eq!(record.frame_len, 1500);
    }

    #[test]
    fn parse_udp_row_with_dotted_addresses() {
        let record = parse_row("10.25,192.168.1.10,192.168.1.20,,,5353,5353,17,120").unwrap();
        assert_eq!(record.src_addr, "192.168.1.10");
        assert_eq!(record.ports, Ports::Udp { src: 5353, dst: 5353 });
        assert_eq!(record.protocol, "UDP");
    }

    #[test]
    fn parse_portless_row() {
        let record = parse_row("3.0,10.0.0.9,10.0.0.10,,,,,1,84").unwrap();
        assert_eq!(record.ports, Ports::None);
        assert_eq!(record.protocol, "ICMP");
    }

    #[test]
    fn parse_unknown_protocol_row() {
        let record = parse_row("3.0,10.0.0.9,10.0.0.10,,,,,253,84").unwrap();
        assert_eq!(record.protocol, "Unknown Protocol Codification: 253");
    }

    #[test]
    fn reject_wrong_column_count() {
        let err = parse_row("1.0,10.0.0.9,10.0.0.10").unwrap_err();
        assert_eq!(
            err,
            RowError::ColumnCount {
                expected: layout::COLUMN_COUNT,
                found: 3
            }
        );
    }

    #[test]
    fn reject_bad_timestamp() {
        let err = parse_row("soon,10.0.0.9,10.0.0.10,,,,,1,84").unwrap_err();
        assert!(matches!(err, RowError::Timestamp { .. }));
    }

    #[test]
    fn reject_bad_frame_len() {
        let err = parse_row("1.0,10.0.0.9,10.0.0.10,,,,,1,big").unwrap_err();
        assert!(matches!(err, RowError::FrameLength { .. }));
    }
}
