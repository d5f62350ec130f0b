//! CSV-file-backed packet source.
//!
//! Grounded on `original_source/simulations/sim_pkts.py`
//! (`get_preprocessed_pkts`/`get_preprocessed_pkts_mapping`), which parse
//! the 14-field input line and select one of the precomputed ingress
//! columns (`rnd_4/8/16/32/64`, `per_4/8/16/32/64`) based on `n_border` and
//! whether persistent mapping is requested. CSV parsing itself follows the
//! teacher's (`nsg-ethz-trix::records`) use of the `csv` crate with serde
//! rather than hand-rolled `split(',')`.

use std::fs::File;
use std::path::Path;

use color_eyre::eyre::{Context as _, Result};
use serde::Deserialize;

use magnifier_core::ip::parse_ipv4;
use magnifier_core::store::{ObservationWindow, PacketRecord, PacketSource, WindowBoundary};

/// One raw input row, in the 14-field order from the external interface.
#[derive(Debug, Deserialize)]
struct InputRow {
    ts: f64,
    src_ip: String,
    #[serde(rename = "prefix_24")]
    _prefix_24: String,
    rnd_4: u16,
    rnd_8: u16,
    rnd_16: u16,
    rnd_32: u16,
    rnd_64: u16,
    per_4: u16,
    per_8: u16,
    per_16: u16,
    per_32: u16,
    per_64: u16,
    flag: u8,
}

impl InputRow {
    fn ingress_column(&self, n_border: u16, persistent: bool) -> u16 {
        match (n_border, persistent) {
            (4, false) => self.rnd_4,
            (8, false) => self.rnd_8,
            (16, false) => self.rnd_16,
            (32, false) => self.rnd_32,
            (64, false) => self.rnd_64,
            (4, true) => self.per_4,
            (8, true) => self.per_8,
            (16, true) => self.per_16,
            (32, true) => self.per_32,
            (64, true) => self.per_64,
            _ => self.rnd_4,
        }
    }
}

/// Reads packets from a CSV file, strictly forward, one window at a time.
pub struct CsvPacketSource {
    reader: csv::Reader<File>,
    n_border: u16,
    persistent_column: bool,
    pending: Option<PacketRecord>,
}

impl CsvPacketSource {
    pub fn open(path: &Path, n_border: u16, persistent_column: bool) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("opening input trace {}", path.display()))?;
        Ok(CsvPacketSource {
            reader,
            n_border,
            persistent_column,
            pending: None,
        })
    }

    fn parse_next(&mut self) -> Option<PacketRecord> {
        loop {
            let mut record = csv::StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    log::warn!("skipping malformed record: {err}");
                    continue;
                }
            }
            let row: InputRow = match record.deserialize(None) {
                Ok(row) => row,
                Err(err) => {
                    log::warn!("skipping malformed record: {err}");
                    continue;
                }
            };
            let src_ip = match parse_ipv4(&row.src_ip) {
                Ok(ip) => ip,
                Err(err) => {
                    log::warn!("skipping record with invalid source IP: {err}");
                    continue;
                }
            };
            let ingress = row.ingress_column(self.n_border, self.persistent_column);
            return Some(PacketRecord::new(src_ip, ingress, row.flag != 0, row.ts));
        }
    }
}

impl PacketSource for CsvPacketSource {
    fn next_window(&mut self, boundary: WindowBoundary, n_border: usize) -> ObservationWindow {
        let mut window = ObservationWindow::new(n_border);

        let first = self.pending.take().or_else(|| self.parse_next());
        let Some(first) = first else {
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
            match self.parse_next() {
                None => break,
                Some(pkt) => {
                    if let WindowBoundary::Duration(duration) = boundary {
                        if pkt.ts - start_ts >= duration {
                            self.pending = Some(pkt);
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
