//! The resumable batch driver.
//!
//! Pairs are processed in resolver order. A pair whose mask file already
//! exists is finished work and is skipped without looking inside it, so a
//! rerun after a crash picks up where the previous run stopped. One pair's
//! failure never stops the batch: it is logged with the offending paths and
//! the loop moves on.

use std::time::Instant;

use log::{debug, info, warn};

use crate::encoder;
use crate::pairs::ChipLabelPair;
use crate::tile::Tile;
use crate::units::{ReconciledUnits, RunParams};

/// One-shot reporter for the resolved run parameters.
///
/// Owned by the batch driver and handed to the encoder, which fires it as
/// soon as the first pair's units are reconciled. It fires at most once per
/// run, even when that first pair later fails; a run where every pair is
/// skipped never fires, since no units are ever resolved.
#[derive(Debug, Default)]
pub struct ParamAnnouncer {
    fired: bool,
}

impl ParamAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn announce(&mut self, tile: &Tile, units: &ReconciledUnits) {
        if self.fired {
            return;
        }
        self.fired = true;

        let (res_x, res_y) = tile.transform.resolution();
        if units.metric {
            info!("resolution (pixel width): {} m/px", res_x.min(res_y));
            info!("boundary width: {} m", units.boundary_width);
            info!("contact spacing: {} m", units.contact_spacing);
        } else {
            info!("boundary width: {} px", units.boundary_width);
            info!("contact spacing: {} px", units.contact_spacing);
        }
    }
}

/// Counts reported by a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Encode every pair that does not already have a mask on disk.
///
/// Existence of the output file is the completion marker; nothing is ever
/// overwritten. Returns the per-run counts regardless of partial failures.
pub fn run(pairs: &[ChipLabelPair], params: &RunParams) -> RunStats {
    let start = Instant::now();
    let mut stats = RunStats::default();
    let mut announcer = ParamAnnouncer::new();

    for pair in pairs {
        if pair.mask.is_file() {
            debug!("mask exists, skipping {}", pair.mask.display());
            stats.skipped += 1;
            continue;
        }

        match encoder::encode(pair, params, &mut announcer) {
            Ok(()) => {
                debug!("wrote {}", pair.mask.display());
                stats.written += 1;
            }
            Err(err) => {
                warn!(
                    "failed to encode label {} against chip {}: {err}",
                    pair.label.display(),
                    pair.chip.display()
                );
                stats.failed += 1;
            }
        }
    }

    info!(
        "masks: {} written, {} skipped, {} failed in {:.1}s",
        stats.written,
        stats.skipped,
        stats.failed,
        start.elapsed().as_secs_f64()
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::tile::GeoTransform;

    #[test]
    fn announcer_fires_once() {
        let tile = Tile {
            width: 4,
            height: 4,
            transform: GeoTransform {
                origin_x: 0.0,
                origin_y: 0.0,
                pixel_width: 0.5,
                pixel_height: -0.5,
            },
            crs: Crs::from_epsg(32636),
        };
        let units = ReconciledUnits {
            boundary_width: 0.5,
            contact_spacing: 0.75,
            metric: true,
        };

        let mut announcer = ParamAnnouncer::new();
        assert!(!announcer.has_fired());
        announcer.announce(&tile, &units);
        assert!(announcer.has_fired());
        announcer.announce(&tile, &units);
        assert!(announcer.has_fired());
    }
}
