use std::net::Ipv4Addr;

use crate::source::Ports;

use super::error::RowError;

/// Resolve an IANA protocol number cell to its canonical label.
///
/// Numbers outside the table and cells that are not numbers at all fall
/// back to a label embedding the literal cell value; a protocol cell never
/// rejects a row.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use flowweave_core::source::export::reader::protocol_label;
///
/// assert_eq!(protocol_label("6"), "TCP");
/// assert_eq!(protocol_label("253"), "Unknown Protocol Codification: 253");
/// ```
pub fn protocol_label(cell: &str) -> String {
    let cell = cell.trim();
    match cell.parse::<u16>() {
        Ok(number) => match protocol_name(number) {
            Some(name) => name.to_string(),
            None => format!("Unknown Protocol Codification: {number}"),
        },
        Err(_) => format!("Unknown Protocol Codification: {cell}"),
    }
}

/// Protocol names for the IANA numbers the capture pipeline emits.
pub fn protocol_name(number: u16) -> Option<&'static str> {
    Some(match number {
        1 => "ICMP",
        2 => "IGMP",
        6 => "TCP",
        17 => "UDP",
        41 => "IPv6",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        58 => "IPv6-ICMP",
        88 => "EIGRP",
        89 => "OSPFIGP",
        132 => "SCTP",
        137 => "MPLS-in-IP",
        _ => return None,
    })
}

/// Decode an address cell, turning integer-encoded IPv4 addresses into
/// dotted form.
///
/// The export writes some addresses as the big-endian integer value of the
/// four octets. Cells that do not parse as `u32` (dotted strings, IPv6,
/// anything else) are kept verbatim; an address cell never rejects a row.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use flowweave_core::source::export::reader::decode_addr;
///
/// assert_eq!(decode_addr("2130706433"), "127.0.0.1");
/// assert_eq!(decode_addr("192.168.1.7"), "192.168.1.7");
/// ```
pub fn decode_addr(cell: &str) -> String {
    let cell = cell.trim();
    match cell.parse::<u32>() {
        Ok(raw) => Ipv4Addr::from(raw).to_string(),
        Err(_) => cell.to_string(),
    }
}

/// Resolve the four port cells into the transport port variant.
///
/// TCP wins when both TCP cells carry a port; otherwise UDP when both UDP
/// cells do; otherwise the record is portless. A half-present pair counts
/// as portless.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// use flowweave_core::source::Ports;
/// use flowweave_core::source::export::reader::resolve_ports;
///
/// let ports = resolve_ports("443", "51000", "", "");
/// assert_eq!(ports, Ports::Tcp { src: 443, dst: 51000 });
/// assert_eq!(resolve_ports("", "", "", ""), Ports::None);
/// ```
pub fn resolve_ports(tcp_src: &str, tcp_dst: &str, udp_src: &str, udp_dst: &str) -> Ports {
    if let (Some(src), Some(dst)) = (parse_port(tcp_src), parse_port(tcp_dst)) {
        return Ports::Tcp { src, dst };
    }
    if let (Some(src), Some(dst)) = (parse_port(udp_src), parse_port(udp_dst)) {
        return Ports::Udp { src, dst };
    }
    Ports::None
}

/// Parse the epoch timestamp cell. Only finite values form a record.
pub fn parse_timestamp(cell: &str) -> Result<f64, RowError> {
    let cell = cell.trim();
    cell.parse::<f64>()
        .ok()
        .filter(|ts| ts.is_finite())
        .ok_or_else(|| RowError::Timestamp {
            cell: cell.to_string(),
        })
}

/// Parse the frame length cell (bytes on the wire).
pub fn parse_frame_len(cell: &str) -> Result<u64, RowError> {
    let cell = cell.trim();
    cell.parse::<u64>().map_err(|_| RowError::FrameLength {
        cell: cell.to_string(),
    })
}

fn parse_port(cell: &str) -> Option<u16> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<u16>().ok()
}
