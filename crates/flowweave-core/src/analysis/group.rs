use std::collections::HashMap;

use crate::source::PacketRecord;
use crate::{EngineConfig, KeyShape};

/// Grouping identity of a record under the configured key shape.
///
/// For bidirectional shapes the endpoint pair is stored in canonical order
/// (smaller endpoint first) so both directions of a conversation hash to
/// the same key. Canonical order is an identity device only; output
/// orientation comes from `FlowEndpoints`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub(crate) struct FlowKey {
    pub src_addr: String,
    pub src_port: Option<u16>,
    pub dst_addr: String,
    pub dst_port: Option<u16>,
    pub protocol: String,
}

impl FlowKey {
    pub(crate) fn from_record(record: &PacketRecord, shape: KeyShape) -> Self {
        let (src_port, dst_port) = if shape.include_ports {
            (record.ports.src(), record.ports.dst())
        } else {
            (None, None)
        };
        let mut key = FlowKey {
            src_addr: record.src_addr.clone(),
            src_port,
            dst_addr: record.dst_addr.clone(),
            dst_port,
            protocol: record.protocol.clone(),
        };
        if shape.bidirectional
            && (key.dst_addr.as_str(), key.dst_port) < (key.src_addr.as_str(), key.src_port)
        {
            std::mem::swap(&mut key.src_addr, &mut key.dst_addr);
            std::mem::swap(&mut key.src_port, &mut key.dst_port);
        }
        key
    }
}

/// Output orientation of a flow: the source side of its first record in
/// time order.
#[derive(Debug, Clone)]
pub(crate) struct FlowEndpoints {
    pub src_addr: String,
    pub src_port: Option<u16>,
    pub dst_addr: String,
    pub dst_port: Option<u16>,
    pub protocol: String,
}

impl FlowEndpoints {
    pub(crate) fn from_first(record: &PacketRecord, shape: KeyShape) -> Self {
        let (src_port, dst_port) = if shape.include_ports {
            (record.ports.src(), record.ports.dst())
        } else {
            (None, None)
        };
        FlowEndpoints {
            src_addr: record.src_addr.clone(),
            src_port,
            dst_addr: record.dst_addr.clone(),
            dst_port,
            protocol: record.protocol.clone(),
        }
    }

    /// A record is forward when its source address matches the nominal
    /// source side. Self-flows count as forward.
    pub(crate) fn is_forward(&self, record: &PacketRecord) -> bool {
        record.src_addr == self.src_addr
    }
}

/// One key's records, time-sorted and ready for segmentation.
#[derive(Debug)]
pub(crate) struct FlowGroup {
    pub endpoints: FlowEndpoints,
    pub records: Vec<PacketRecord>,
}

/// Partition records by flow key, sort each group by timestamp (stable,
/// so equal timestamps keep capture order) and drop groups under the
/// configured minimum size.
pub(crate) fn build_flow_groups(
    records: Vec<PacketRecord>,
    config: &EngineConfig,
) -> Vec<FlowGroup> {
    let mut by_key: HashMap<FlowKey, Vec<PacketRecord>> = HashMap::new();
    for record in records {
        by_key
            .entry(FlowKey::from_record(&record, config.key_shape))
            .or_default()
            .push(record);
    }

    let mut discarded = 0u64;
    let mut groups = Vec::with_capacity(by_key.len());
    for (_, mut group) in by_key {
        if group.len() < config.min_packets {
            discarded += 1;
            continue;
        }
        group.sort_by(|a, b| a.ts.total_cmp(&b.ts));
        let endpoints = FlowEndpoints::from_first(&group[0], config.key_shape);
        groups.push(FlowGroup {
            endpoints,
            records: group,
        });
    }
    if discarded > 0 {
        log::debug!(
            "discarded {discarded} flow groups under {} records",
            config.min_packets
        );
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::{FlowKey, build_flow_groups};
    use crate::source::{PacketRecord, Ports};
    use crate::{EngineConfig, KeyShape};

    fn record(ts: f64, src: &str, dst: &str, ports: Ports) -> PacketRecord {
        PacketRecord {
            ts,
            src_addr: src.to_string(),
            dst_addr: dst.to_string(),
            ports,
            protocol: "TCP".to_string(),
            frame_len: 100,
        }
    }

    fn tcp(src: u16, dst: u16) -> Ports {
        Ports::Tcp { src, dst }
    }

    #[test]
    fn bidirectional_key_folds_both_directions() {
        let shape = KeyShape::default();
        let forward =
            FlowKey::from_record(&record(0.0, "10.0.0.1", "10.0.0.2", tcp(443, 51000)), shape);
        let reverse =
            FlowKey::from_record(&record(1.0, "10.0.0.2", "10.0.0.1", tcp(51000, 443)), shape);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn directional_key_keeps_directions_apart() {
        let shape = KeyShape {
            bidirectional: false,
            ..KeyShape::default()
        };
        let forward =
            FlowKey::from_record(&record(0.0, "10.0.0.1", "10.0.0.2", tcp(443, 51000)), shape);
        let reverse =
            FlowKey::from_record(&record(1.0, "10.0.0.2", "10.0.0.1", tcp(51000, 443)), shape);
        assert_ne!(forward, reverse);
    }

    #[test]
    fn portless_shape_folds_port_variants() {
        let shape = KeyShape {
            include_ports: false,
            ..KeyShape::default()
        };
        let a = FlowKey::from_record(&record(0.0, "10.0.0.1", "10.0.0.2", tcp(443, 51000)), shape);
        let b = FlowKey::from_record(&record(1.0, "10.0.0.1", "10.0.0.2", tcp(443, 52000)), shape);
        assert_eq!(a, b);
        assert_eq!(a.src_port, None);
    }

    #[test]
    fn groups_are_sorted_and_small_ones_dropped() {
        let config = EngineConfig::default();
        let records = vec![
            record(5.0, "10.0.0.1", "10.0.0.2", tcp(443, 51000)),
            record(1.0, "10.0.0.2", "10.0.0.1", tcp(51000, 443)),
            record(3.0, "10.0.0.3", "10.0.0.4", tcp(80, 40000)),
        ];

        let groups = build_flow_groups(records, &config);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.records.len(), 2);
        assert!(group.records[0].ts <= group.records[1].ts);
    }

    #[test]
    fn endpoints_follow_the_first_record_in_time_order() {
        let config = EngineConfig::default();
        // The conversation is opened by 10.0.0.2 even though canonical key
        // order would list 10.0.0.1 first.
        let records = vec![
            record(2.0, "10.0.0.1", "10.0.0.2", tcp(443, 51000)),
            record(1.0, "10.0.0.2", "10.0.0.1", tcp(51000, 443)),
        ];

        let groups = build_flow_groups(records, &config);
        assert_eq!(groups.len(), 1);
        let endpoints = &groups[0].endpoints;
        assert_eq!(endpoints.src_addr, "10.0.0.2");
        assert_eq!(endpoints.src_port, Some(51000));
        assert_eq!(endpoints.dst_addr, "10.0.0.1");
    }

    #[test]
    fn min_packets_one_keeps_singletons() {
        let config = EngineConfig {
            min_packets: 1,
            ..EngineConfig::default()
        };
        let records = vec![record(3.0, "10.0.0.3", "10.0.0.4", tcp(80, 40000))];
        let groups = build_flow_groups(records, &config);
        assert_eq!(groups.len(), 1);
    }
}
