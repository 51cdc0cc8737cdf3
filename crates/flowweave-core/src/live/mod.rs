//! Online segmentation for record streams.
//!
//! Applies the batch pipeline's idle rule while records are still
//! arriving. Each active key owns an open segment behind its own lock;
//! the shared map is locked only to fetch, insert, or drop a key's
//! entry, so concurrent producers contend per key rather than on one
//! global lock.
//!
//! Because group totals are unknowable online, the minimum-size rule is
//! applied to each closed segment here instead of whole groups.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::analysis::group::{FlowEndpoints, FlowKey};
use crate::analysis::segment::FlowSegment;
use crate::analysis::stats::{sort_flows, summarize_segment};
use crate::source::PacketRecord;
use crate::{EngineConfig, FlowSummary, KeyShape};

struct OpenFlow {
    endpoints: FlowEndpoints,
    records: Vec<PacketRecord>,
    last_ts: f64,
    retired: bool,
}

impl OpenFlow {
    fn new(record: PacketRecord, shape: KeyShape) -> Self {
        let endpoints = FlowEndpoints::from_first(&record, shape);
        OpenFlow {
            endpoints,
            last_ts: record.ts,
            records: vec![record],
            retired: false,
        }
    }

    fn append(&mut self, record: PacketRecord) {
        self.last_ts = self.last_ts.max(record.ts);
        self.records.push(record);
    }

    /// Freeze the open segment and reduce it to a row. Segments under
    /// `min_packets` yield nothing. The state stays usable for the next
    /// segment of the same key.
    fn close(&mut self, min_packets: usize) -> Option<FlowSummary> {
        let mut records = std::mem::take(&mut self.records);
        if records.is_empty() || records.len() < min_packets {
            return None;
        }
        // Live arrivals may be slightly out of order; restore time order
        // before the segment freezes.
        records.sort_by(|a, b| a.ts.total_cmp(&b.ts));
        Some(summarize_segment(&self.endpoints, &FlowSegment::new(records)))
    }
}

/// Streaming counterpart of the batch pipeline.
///
/// `push` feeds one record and may emit the row of a segment the idle
/// rule just closed; `sweep_idle` flushes keys that went quiet;
/// `finish` flushes every open segment at end of stream or shutdown.
pub struct LiveSegmenter {
    config: EngineConfig,
    flows: Mutex<HashMap<FlowKey, Arc<Mutex<OpenFlow>>>>,
}

impl LiveSegmenter {
    pub fn new(config: EngineConfig) -> Self {
        LiveSegmenter {
            config,
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Feed one record. Returns the summary of the previous segment when
    /// the record sits more than the idle threshold away from it, ahead
    /// (the flow went quiet) or behind (appending would bury a hole wider
    /// than the threshold inside the segment).
    pub fn push(&self, record: PacketRecord) -> Option<FlowSummary> {
        let key = FlowKey::from_record(&record, self.config.key_shape);
        loop {
            let state = {
                let mut flows = self.lock_map();
                match flows.get(&key) {
                    Some(state) => Arc::clone(state),
                    None => {
                        let state = Arc::new(Mutex::new(OpenFlow::new(
                            record,
                            self.config.key_shape,
                        )));
                        flows.insert(key, state);
                        return None;
                    }
                }
            };

            let mut open = lock_state(&state);
            if open.retired {
                // Lost a race against a sweep. Drop the stale entry, unless
                // another push already re-created the key, then start over.
                drop(open);
                let mut flows = self.lock_map();
                if let Some(current) = flows.get(&key) {
                    if Arc::ptr_eq(current, &state) {
                        flows.remove(&key);
                    }
                }
                continue;
            }
            let emitted = if (record.ts - open.last_ts).abs() > self.config.idle_timeout_s {
                let emitted = open.close(self.config.min_packets);
                // The record starts the next segment; its distance to the
                // closed one must not count as that segment's span.
                open.last_ts = record.ts;
                emitted
            } else {
                None
            };
            open.append(record);
            return emitted;
        }
    }

    /// Flush and retire every key idle strictly longer than the
    /// threshold at `now_ts`. Returned rows are sorted like batch output.
    ///
    /// Segments are closed under their own key's lock; the shared map is
    /// locked only to snapshot the states and to prune retired entries,
    /// so pushes for active keys never wait out a whole sweep.
    pub fn sweep_idle(&self, now_ts: f64) -> Vec<FlowSummary> {
        let states: Vec<_> = self.lock_map().values().map(Arc::clone).collect();

        let mut flushed = Vec::new();
        for state in &states {
            let mut open = lock_state(state);
            if now_ts - open.last_ts <= self.config.idle_timeout_s {
                continue;
            }
            if let Some(summary) = open.close(self.config.min_packets) {
                flushed.push(summary);
            }
            open.retired = true;
        }

        // A key re-created by a racing push holds a fresh state and is kept.
        self.lock_map().retain(|_, state| !lock_state(state).retired);

        sort_flows(&mut flushed);
        flushed
    }

    /// Flush every open segment; used at end of stream and on
    /// cancellation so no closed-but-unemitted data is lost.
    pub fn finish(&self) -> Vec<FlowSummary> {
        let mut flushed = Vec::new();
        {
            let mut flows = self.lock_map();
            for (_, state) in flows.drain() {
                let mut open = lock_state(&state);
                if let Some(summary) = open.close(self.config.min_packets) {
                    flushed.push(summary);
                }
                open.retired = true;
            }
        }
        sort_flows(&mut flushed);
        flushed
    }

    /// Number of keys with an open segment.
    pub fn open_flows(&self) -> usize {
        self.lock_map().len()
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<FlowKey, Arc<Mutex<OpenFlow>>>> {
        self.flows.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_state(state: &Mutex<OpenFlow>) -> MutexGuard<'_, OpenFlow> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::LiveSegmenter;
    use crate::EngineConfig;
    use crate::source::{PacketRecord, Ports};

    fn record(ts: f64, src: &str, dst: &str, src_port: u16, dst_port: u16) -> PacketRecord {
        PacketRecord {
            ts,
            src_addr: src.to_string(),
            dst_addr: dst.to_string(),
            ports: Ports::Udp {
                src: src_port,
                dst: dst_port,
            },
            protocol: "UDP".to_string(),
            frame_len: 100,
        }
    }

    #[test]
    fn records_inside_threshold_stay_open_until_finish() {
        let live = LiveSegmenter::new(EngineConfig::default());
        assert!(live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());
        assert!(live.push(record(1.0, "10.0.0.2", "10.0.0.1", 6000, 5000)).is_none());
        assert!(live.push(record(2.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());
        assert_eq!(live.open_flows(), 1);

        let flushed = live.finish();
        assert_eq!(flushed.len(), 1);
        let summary = &flushed[0];
        assert_eq!(summary.packets_src, 2);
        assert_eq!(summary.packets_dst, 1);
        assert_eq!(summary.duration_s, 2.0);
        assert_eq!(live.open_flows(), 0);
    }

    #[test]
    fn idle_gap_emits_the_previous_segment() {
        let live = LiveSegmenter::new(EngineConfig::default());
        assert!(live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());
        assert!(live.push(record(5.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());

        let emitted = live
            .push(record(40.0, "10.0.0.1", "10.0.0.2", 5000, 6000))
            .expect("gap closes the segment");
        assert_eq!(emitted.packets_src, 2);
        assert_eq!(emitted.duration_s, 5.0);

        // The trailing singleton stays under min_packets.
        assert!(live.finish().is_empty());
    }

    #[test]
    fn sweep_flushes_only_strictly_idle_keys() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(1.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(25.0, "10.0.0.3", "10.0.0.4", 5000, 6000));
        live.push(record(26.0, "10.0.0.3", "10.0.0.4", 5000, 6000));

        let flushed = live.sweep_idle(32.0);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].src_addr, "10.0.0.1");
        assert_eq!(live.open_flows(), 1);
    }

    #[test]
    fn sweep_at_exact_threshold_keeps_the_key() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(1.0, "10.0.0.1", "10.0.0.2", 5000, 6000));

        assert!(live.sweep_idle(31.0).is_empty());
        assert_eq!(live.open_flows(), 1);
    }

    #[test]
    fn orientation_survives_an_idle_gap() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(1.0, "10.0.0.2", "10.0.0.1", 6000, 5000));

        let emitted = live
            .push(record(40.0, "10.0.0.2", "10.0.0.1", 6000, 5000))
            .expect("gap closes the segment");
        assert_eq!(emitted.src_addr, "10.0.0.1");

        live.push(record(41.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        let flushed = live.finish();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].src_addr, "10.0.0.1");
        assert_eq!(flushed[0].packets_dst, 1);
    }

    #[test]
    fn keys_do_not_interfere() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(0.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(0.5, "10.0.0.3", "10.0.0.4", 7000, 8000));
        live.push(record(1.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(1.5, "10.0.0.3", "10.0.0.4", 7000, 8000));
        assert_eq!(live.open_flows(), 2);

        let flushed = live.finish();
        assert_eq!(flushed.len(), 2);
        assert!(flushed[0].src_addr < flushed[1].src_addr);
    }

    #[test]
    fn out_of_order_records_do_not_split_or_rewind() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(10.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        assert!(live.push(record(9.5, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());

        let flushed = live.finish();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].duration_s, 0.5);
    }

    #[test]
    fn a_record_far_behind_the_open_segment_closes_it() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(100.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        live.push(record(101.0, "10.0.0.1", "10.0.0.2", 5000, 6000));

        let emitted = live
            .push(record(50.0, "10.0.0.1", "10.0.0.2", 5000, 6000))
            .expect("stale record closes the segment");
        assert_eq!(emitted.packets_src, 2);
        assert_eq!(emitted.duration_s, 1.0);

        // The restarted segment measures from the stale record, not from
        // the closed segment's clock.
        assert!(live.push(record(60.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());
        let flushed = live.finish();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].duration_s, 10.0);
    }

    #[test]
    fn a_backward_gap_at_the_threshold_still_appends() {
        let live = LiveSegmenter::new(EngineConfig::default());
        live.push(record(100.0, "10.0.0.1", "10.0.0.2", 5000, 6000));
        assert!(live.push(record(70.0, "10.0.0.1", "10.0.0.2", 5000, 6000)).is_none());

        let flushed = live.finish();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].duration_s, 30.0);
    }

    #[test]
    fn concurrent_pushes_and_sweeps_account_for_every_record() {
        let config = EngineConfig {
            min_packets: 1,
            ..EngineConfig::default()
        };
        let live = LiveSegmenter::new(config);

        // Every record lands in exactly one emitted row, however the
        // sweeps interleave with the pushes.
        let mut counted = 0u64;
        std::thread::scope(|scope| {
            let pushed = scope.spawn(|| {
                let mut counted = 0u64;
                for i in 0..400u32 {
                    let ts = f64::from(i) * 7.0;
                    if let Some(row) = live.push(record(ts, "10.0.0.1", "10.0.0.2", 5000, 6000)) {
                        counted += row.packets_src + row.packets_dst;
                    }
                }
                counted
            });
            for i in 0..50u32 {
                for row in live.sweep_idle(f64::from(i) * 60.0) {
                    counted += row.packets_src + row.packets_dst;
                }
            }
            counted += pushed.join().expect("pusher thread");
        });
        for row in live.finish() {
            counted += row.packets_src + row.packets_dst;
        }

        assert_eq!(counted, 400);
        assert_eq!(live.open_flows(), 0);
    }
}
