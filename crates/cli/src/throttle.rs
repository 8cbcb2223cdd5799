//! Client-side pacing for bulk imports.

use nwd_core::{CertificationService, CoreResult, ImportReport, ImportRow, Actor};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Throttle {
    pub chunk_size: usize,
    pub rows_per_second: u32,
}

impl Throttle {
    /// Minimum wall time a chunk of `rows` rows must take.
    pub fn chunk_budget(&self, rows: usize) -> Duration {
        if self.rows_per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rows as f64 / f64::from(self.rows_per_second))
    }
}

/// Imports `rows` in chunks, sleeping between chunks to hold the configured rate.
pub fn import_throttled(
    service: &CertificationService,
    actor: &Actor,
    rows: &[ImportRow],
    throttle: Throttle,
    mut on_chunk: impl FnMut(usize, usize),
) -> CoreResult<ImportReport> {
    let mut report = ImportReport::default();
    let chunk_size = throttle.chunk_size.max(1);

    for (index, chunk) in rows.chunks(chunk_size).enumerate() {
        let started = Instant::now();
        let offset = index * chunk_size;
        report.merge(service.import_qualifications(actor, chunk)?, offset);
        on_chunk(offset + chunk.len(), rows.len());

        let is_last = offset + chunk.len() >= rows.len();
        if !is_last {
            if let Some(rest) = throttle.chunk_budget(chunk.len()).checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }
    Ok(report)
}
