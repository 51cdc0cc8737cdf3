use crate::source::PacketRecord;

/// A maximal run of one flow's records with no idle gap inside. Frozen
/// once built; records stay in time order.
#[derive(Debug, Clone)]
pub(crate) struct FlowSegment {
    records: Vec<PacketRecord>,
}

impl FlowSegment {
    pub(crate) fn new(records: Vec<PacketRecord>) -> Self {
        debug_assert!(!records.is_empty());
        debug_assert!(records.windows(2).all(|pair| pair[0].ts <= pair[1].ts));
        FlowSegment { records }
    }

    pub(crate) fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub(crate) fn first_ts(&self) -> f64 {
        self.records[0].ts
    }

    pub(crate) fn last_ts(&self) -> f64 {
        self.records[self.records.len() - 1].ts
    }
}

/// Split a time-sorted run of records at idle gaps.
///
/// A segment closes whenever the gap to the previous record is strictly
/// greater than `idle_timeout_s`; the record after the gap opens the next
/// segment. A gap exactly equal to the threshold does not split. The
/// returned segments concatenate back to the input.
pub(crate) fn split_on_idle(records: &[PacketRecord], idle_timeout_s: f64) -> Vec<FlowSegment> {
    let mut segments = Vec::new();
    let mut open: Vec<PacketRecord> = Vec::new();

    for record in records {
        if let Some(previous) = open.last() {
            if record.ts - previous.ts > idle_timeout_s {
                segments.push(FlowSegment::new(std::mem::take(&mut open)));
            }
        }
        open.push(record.clone());
    }
    if !open.is_empty() {
        segments.push(FlowSegment::new(open));
    }
    segments
}
