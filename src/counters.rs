//! Per-stream receive-side statistics: packet count, out-of-order, loss,
//! jitter, byte count.
//!
//! Grounded line-for-line on `iperf_data.py::Counters.process_header` (the
//! authoritative `iperf_*` variant; `helper_data.py` is an earlier draft
//! and is not consulted here).

use crate::framing::PacketHeader;

/// Receive-side jitter/loss/reorder accounting for one stream or peer.
#[derive(Debug, Clone)]
pub struct Counters {
    pub packet_count: i64,
    pub jitter: f64,
    prev_transit: f64,
    first_packet: bool,
    pub outoforder_packets: u64,
    pub cnt_error: i64,
    pub bytes_received: u64,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            packet_count: 0,
            jitter: 0.0,
            prev_transit: 0.0,
            first_packet: true,
            outoforder_packets: 0,
            cnt_error: 0,
            bytes_received: 0,
        }
    }

    /// Process one received packet: a decoded header plus the total wire
    /// length `len` of the datagram/chunk it arrived in.
    ///
    /// `now_wall` is the receive timestamp expressed in the same units as
    /// `header.sec`/`header.usec` (seconds since the Unix epoch), so the
    /// two ends agree on a common timeline without sharing a process-local
    /// clock. Both [`crate::stream::udp::send_once`] and the caller here
    /// derive this from wall-clock time for that reason.
    pub fn process_header(&mut self, header: &PacketHeader, len: usize, now_wall: f64) {
        self.bytes_received += len as u64;

        if header.packet_count > self.packet_count {
            if header.packet_count > self.packet_count + 1 {
                self.cnt_error += (header.packet_count - 1) - self.packet_count;
            }
            self.packet_count = header.packet_count;
        } else {
            self.outoforder_packets += 1;
            if self.cnt_error > 0 {
                self.cnt_error -= 1;
            }
        }

        let transit = now_wall - header.sec as f64 - header.usec as f64 / 1e6;
        self.update_jitter(transit);
    }

    /// Same accounting, but driven directly by a precomputed transit time
    /// (receive_time - send_time, seconds). Used by tests that want to
    /// exercise the jitter formula in isolation (spec property 5) without a
    /// real monotonic clock.
    pub fn process_transit(&mut self, transit: f64) {
        self.update_jitter(transit);
    }

    fn update_jitter(&mut self, transit: f64) {
        if self.first_packet {
            self.prev_transit = transit;
            self.first_packet = false;
            return;
        }
        let diff = (transit - self.prev_transit).abs();
        self.prev_transit = transit;
        self.jitter += (diff - self.jitter) / 16.0;
    }
}
