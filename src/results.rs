//! Result collation: CPU-time deltas since `TEST_START`, the list of
//! terminal per-stream results, and (server-side) synthetic per-peer
//! entries built from the data-plane server's Counters map.
//!
//! Grounded on `iperf_control.py::collate_results` (CPU snapshot, streams
//! list) and `iperf_data_server.py`'s per-peer `Counters` (for the
//! server-side synthetic entries built below).

use serde::{Deserialize, Serialize};

use crate::dataplane::PeerMap;
use crate::stream::StreamResult;

/// A CPU-time snapshot taken at `TEST_START`, subtracted from a later
/// snapshot to produce the deltas in the final results object.
#[derive(Debug, Clone, Copy)]
pub struct CpuSnapshot {
    pub user: f64,
    pub system: f64,
}

impl CpuSnapshot {
    pub fn now() -> Self {
        match nix::sys::resource::getrusage(nix::sys::resource::UsageWho::RUSAGE_SELF) {
            Ok(usage) => Self {
                user: timeval_secs(usage.user_time()),
                system: timeval_secs(usage.system_time()),
            },
            Err(_) => Self {
                user: 0.0,
                system: 0.0,
            },
        }
    }
}

fn timeval_secs(tv: nix::sys::time::TimeVal) -> f64 {
    tv.tv_sec() as f64 + tv.tv_usec() as f64 / 1e6
}

/// The JSON object exchanged at `EXCHANGE_RESULTS`, matching the reference's
/// result dict shape exactly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TestResults {
    pub cpu_util_system: f64,
    pub cpu_util_user: f64,
    pub cpu_util_total: f64,
    pub sender_has_retransmits: u32,
    pub streams: Vec<StreamResult>,
}

/// Collate local results: CPU deltas since `start`, plus the terminal
/// result of every stream handle (already shut down by the caller).
pub fn collate(start: CpuSnapshot, stream_results: Vec<StreamResult>) -> TestResults {
    let now = CpuSnapshot::now();
    let cpu_util_user = now.user - start.user;
    let cpu_util_system = now.system - start.system;
    TestResults {
        cpu_util_system,
        cpu_util_user,
        cpu_util_total: cpu_util_user + cpu_util_system,
        sender_has_retransmits: 0,
        streams: stream_results,
    }
}

/// Server-side addendum: one synthetic stream result per observed peer in
/// the data-plane server's peer map, using the same quirked id numbering as
/// client-created streams.
pub async fn collate_server_peers(
    peers: &PeerMap,
    start_time: f64,
    now_wall: f64,
) -> Vec<StreamResult> {
    let map = peers.lock().await;
    let ids = crate::stream::stream_ids(map.len() as u32);
    map.values()
        .zip(ids)
        .map(|(state, id)| StreamResult {
            id,
            bytes: state.counters.bytes_received,
            retransmits: 0,
            jitter: state.counters.jitter,
            errors: state.counters.cnt_error,
            packets: state.counters.packet_count,
            start_time: 0.0,
            end_time: now_wall - start_time,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collate_sums_cpu_deltas_and_carries_sender_flag() {
        let start = CpuSnapshot {
            user: 1.0,
            system: 0.5,
        };
        let results = collate(
            start,
            vec![StreamResult {
                id: 1,
                bytes: 100,
                ..Default::default()
            }],
        );
        assert_eq!(results.sender_has_retransmits, 0);
        assert_eq!(results.streams.len(), 1);
        assert!((results.cpu_util_total - (results.cpu_util_user + results.cpu_util_system)).abs() < 1e-12);
    }
}
