//! Observation windows: the unit of work the driver pulls from a packet
//! source on each iteration.
//!
//! Grounded on `original_source/simulations/sim_pkts.py`
//! (`get_preprocessed_pkts`, `get_preprocessed_pkts_mapping`), which split
//! an incoming trace into fixed-size or fixed-duration windows and bucket
//! each window's packets by ingress router.

use crate::ip::Prefix;

/// One parsed input record, after ingress resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketRecord {
    pub src_ip: u32,
    pub src_24: Prefix,
    pub ingress: u16,
    pub flag: bool,
    pub ts: f64,
}

impl PacketRecord {
    pub fn new(src_ip: u32, ingress: u16, flag: bool, ts: f64) -> Self {
        PacketRecord {
            src_ip,
            src_24: Prefix::slash_24(src_ip),
            ingress,
            flag,
            ts,
        }
    }
}

/// How a window's boundary is decided.
///
/// `original_source` supports both: real-time windowing compares elapsed
/// wall-clock timestamp against `slice_duration` seconds, count windowing
/// just counts `slice_duration` packets.
#[derive(Debug, Clone, Copy)]
pub enum WindowBoundary {
    Duration(f64),
    PacketCount(usize),
}

/// A single iteration's worth of packets, already partitioned by ingress.
///
/// The original kept a parallel `border_flags` array alongside
/// `border_pkts` (`sim_pkts.py::get_preprocessed_pkts`) because its packet
/// tuples didn't carry a named flag field; here `PacketRecord::flag` makes
/// that second array redundant.
#[derive(Debug, Clone, Default)]
pub struct ObservationWindow {
    pub pkts: Vec<PacketRecord>,
    pub border_pkts: Vec<Vec<PacketRecord>>,
}

impl ObservationWindow {
    pub fn new(n_border: usize) -> Self {
        ObservationWindow {
            pkts: Vec::new(),
            border_pkts: vec![Vec::new(); n_border],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pkts.is_empty()
    }

    pub fn push(&mut self, pkt: PacketRecord) {
        let idx = pkt.ingress as usize;
        self.border_pkts[idx].push(pkt);
        self.pkts.push(pkt);
    }
}

/// Abstraction over "read the next window of packets", so the driver and
/// unit tests can use an in-memory source interchangeably with a
/// CSV-file-backed one (`magnifier-sim::csv_source::CsvPacketSource`).
pub trait PacketSource {
    /// Reads and returns the next window, advancing strictly forward.
    /// Returns an empty window at end of input.
    fn next_window(&mut self, boundary: WindowBoundary, n_border: usize) -> ObservationWindow;
}

/// A `PacketSource` backed by an in-memory list, for tests and for replay
/// of already-collected fixtures.
pub struct VecPacketSource {
    records: std::vec::IntoIter<PacketRecord>,
    next: Option<PacketRecord>,
}

impl VecPacketSource {
    pub fn new(records: Vec<PacketRecord>) -> Self {
        let mut iter = records.into_iter();
        let next = iter.next();
        VecPacketSource { records: iter, next }
    }
}

impl PacketSource for VecPacketSource {
    fn next_window(&mut self, boundary: WindowBoundary, n_border: usize) -> ObservationWindow {
        let mut window = ObservationWindow::new(n_border);
        let Some(first) = self.next.take() else {
            return window;
        };
        let start_ts = first.ts;
        window.push(first);

        loop {
            if let WindowBoundary::PacketCount(count) = boundary {
                if window.pkts.len() >= count {
                    break;
                }
            }
            match self.records.next() {
                None => {
                    self.next = None;
                    break;
                }
                Some(pkt) => {
                    if let WindowBoundary::Duration(duration) = boundary {
                        if pkt.ts - start_ts >= duration {
                            self.next = Some(pkt);
                            break;
                        }
                    }
                    window.push(pkt);
                }
            }
        }
        window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(ip: &str, ingress: u16, ts: f64) -> PacketRecord {
        PacketRecord::new(crate::ip::parse_ipv4(ip).unwrap(), ingress, false, ts)
    }

    #[test]
    fn count_windowing_splits_by_packet_count() {
        let records = vec![
            pkt("1.2.3.1", 0, 0.0),
            pkt("1.2.3.2", 1, 0.1),
            pkt("1.2.3.3", 0, 0.2),
            pkt("1.2.3.4", 1, 0.3),
        ];
        let mut source = VecPacketSource::new(records);
        let w1 = source.next_window(WindowBoundary::PacketCount(2), 2);
        assert_eq!(w1.pkts.len(), 2);
        let w2 = source.next_window(WindowBoundary::PacketCount(2), 2);
        assert_eq!(w2.pkts.len(), 2);
        let w3 = source.next_window(WindowBoundary::PacketCount(2), 2);
        assert!(w3.is_empty());
    }

    #[test]
    fn duration_windowing_splits_by_elapsed_time() {
        let records = vec![
            pkt("1.2.3.1", 0, 0.0),
            pkt("1.2.3.2", 0, 0.5),
            pkt("1.2.3.3", 0, 1.5),
            pkt("1.2.3.4", 0, 1.6),
        ];
        let mut source = VecPacketSource::new(records);
        let w1 = source.next_window(WindowBoundary::Duration(1.0), 1);
        assert_eq!(w1.pkts.len(), 2);
        let w2 = source.next_window(WindowBoundary::Duration(1.0), 1);
        assert_eq!(w2.pkts.len(), 2);
    }
}
