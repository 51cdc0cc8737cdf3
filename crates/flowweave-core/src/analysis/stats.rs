use crate::FlowSummary;
use crate::source::PacketRecord;

use super::group::FlowEndpoints;
use super::segment::FlowSegment;

/// Decimal places kept for the reported inter-arrival median.
const IAT_DECIMALS: i32 = 5;

/// Reduce one closed segment to its output row. Records whose source
/// address matches the nominal source count as forward traffic.
pub(crate) fn summarize_segment(endpoints: &FlowEndpoints, segment: &FlowSegment) -> FlowSummary {
    let mut packets_src = 0u64;
    let mut packets_dst = 0u64;
    let mut bytes_src = 0u64;
    let mut bytes_dst = 0u64;
    for record in segment.records() {
        if endpoints.is_forward(record) {
            packets_src += 1;
            bytes_src += record.frame_len;
        } else {
            packets_dst += 1;
            bytes_dst += record.frame_len;
        }
    }

    FlowSummary {
        src_addr: endpoints.src_addr.clone(),
        dst_addr: endpoints.dst_addr.clone(),
        src_port: endpoints.src_port,
        dst_port: endpoints.dst_port,
        protocol: endpoints.protocol.clone(),
        packets_src,
        packets_dst,
        bytes_src,
        bytes_dst,
        duration_s: segment.last_ts() - segment.first_ts(),
        iat_median_s: round_to(median(&inter_arrivals(segment.records())), IAT_DECIMALS),
    }
}

/// Sort rows by endpoint tuple so output is stable across runs. The sort
/// is stable, so each flow's segments keep their emission order.
pub(crate) fn sort_flows(flows: &mut [FlowSummary]) {
    flows.sort_by(|a, b| {
        a.src_addr
            .cmp(&b.src_addr)
            .then_with(|| a.dst_addr.cmp(&b.dst_addr))
            .then_with(|| a.src_port.cmp(&b.src_port))
            .then_with(|| a.dst_port.cmp(&b.dst_port))
            .then_with(|| a.protocol.cmp(&b.protocol))
    });
}

/// Consecutive timestamp differences; the first element is 0 by
/// convention, so the sequence has one entry per record.
fn inter_arrivals(records: &[PacketRecord]) -> Vec<f64> {
    let mut iats = Vec::with_capacity(records.len());
    let mut previous: Option<f64> = None;
    for record in records {
        iats.push(previous.map_or(0.0, |prev| record.ts - prev));
        previous = Some(record.ts);
    }
    iats
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
