//! Negotiated test parameters, serialized as JSON over the control channel.
//!
//! Unknown fields from the reference parameter set (`window`, `congestion`,
//! `omit`, `bytes`, `blockcount`, `nodelay`, `title`, `get_server_output`,
//! ...) are preserved through an opaque `extras` map so PARAM_EXCHANGE and
//! EXCHANGE_RESULTS stay wire-compatible.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `tcp` xor `udp`, as negotiated with the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Negotiated test parameters exchanged at `PARAM_EXCHANGE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    /// Present (and truthy) when the test uses TCP; mutually exclusive with
    /// `udp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<u8>,
    /// Present (and truthy) when the test uses UDP; mutually exclusive with
    /// `tcp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp: Option<u8>,
    /// Test duration in seconds.
    pub time: u64,
    /// Number of parallel streams.
    pub parallel: u32,
    /// TCP payload length in bytes.
    #[serde(rename = "len", skip_serializing_if = "Option::is_none")]
    pub len: Option<u32>,
    /// MSS discovered for UDP via `TCP_MAXSEG` on the control socket;
    /// filled in by `CREATE_STREAMS` handling, not sent by the initiator.
    #[serde(rename = "MSS", skip_serializing_if = "Option::is_none")]
    pub mss: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub udp_counters_64bit: Option<bool>,
    /// Server-side reporting interval, echoed here so both ends agree on
    /// the `TEST_RUNNING` cadence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,

    /// Everything else the reference parameter set carries, preserved
    /// verbatim for wire compatibility.
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl Params {
    pub fn new(transport: Transport, time: u64, parallel: u32) -> Self {
        let (tcp, udp) = match transport {
            Transport::Tcp => (Some(1), None),
            Transport::Udp => (None, Some(1)),
        };
        Self {
            tcp,
            udp,
            time,
            parallel,
            len: if transport == Transport::Tcp {
                Some(131_072)
            } else {
                None
            },
            mss: None,
            reverse: None,
            udp_counters_64bit: None,
            interval: None,
            extras: Map::new(),
        }
    }

    pub fn transport(&self) -> Transport {
        if self.udp.is_some() {
            Transport::Udp
        } else {
            Transport::Tcp
        }
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse.unwrap_or(false)
    }

    pub fn is_long_counters(&self) -> bool {
        self.udp_counters_64bit.unwrap_or(false)
    }

    /// Payload/read size: MSS when known (UDP), else `len` (TCP).
    pub fn max_packet_size(&self) -> u32 {
        self.mss.or(self.len).unwrap_or(131_072)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_round_trip_through_extras() {
        let wire = r#"{"tcp":1,"time":2,"parallel":1,"len":131072,"window":4096,"title":"hi"}"#;
        let parsed: Params = serde_json::from_str(wire).unwrap();
        assert_eq!(parsed.extras.get("window").unwrap(), 4096);
        assert_eq!(parsed.extras.get("title").unwrap(), "hi");

        let encoded = serde_json::to_value(&parsed).unwrap();
        assert_eq!(encoded["window"], 4096);
        assert_eq!(encoded["title"], "hi");
        assert_eq!(encoded["time"], 2);
    }

    #[test]
    fn transport_selector_is_exclusive() {
        let p = Params::new(Transport::Udp, 3, 2);
        assert_eq!(p.transport(), Transport::Udp);
        assert!(p.udp.is_some());
        assert!(p.tcp.is_none());
    }
}
