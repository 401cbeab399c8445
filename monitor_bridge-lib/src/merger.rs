use log::debug;

use crate::message::VitalSign;

/// Coalesces successive vital-sign reports that share a timestamp.
///
/// At most one report is pending. A report with a new timestamp flushes the
/// pending one, which is returned to the caller for publication.
#[derive(Debug, Default)]
pub struct VitalMerger {
    pending: Option<VitalSign>,
}

impl VitalMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Option<&VitalSign> {
        self.pending.as_ref()
    }

    /// Feed one decoded report; returns the report to publish, if any.
    pub fn offer(&mut self, vs: VitalSign) -> Option<VitalSign> {
        if vs.is_empty() {
            debug!("dropping empty vital sign");
            return None;
        }
        let Some(cached) = self.pending.as_mut() else {
            self.pending = Some(vs);
            return None;
        };
        if cached.timestamp == vs.timestamp {
            cached.merge_from(&vs);
            return None;
        }
        self.pending.replace(vs)
    }

    /// Take the pending report, leaving the merger empty.
    pub fn flush(&mut self) -> Option<VitalSign> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    fn vital(timestamp: i64, hr: &str, spo2: &str) -> VitalSign {
        VitalSign {
            timestamp,
            hr: Some(hr.into()),
            spo2: Some(spo2.into()),
            ..Default::default()
        }
    }

    #[fixture]
    fn merger() -> VitalMerger {
        VitalMerger::new()
    }

    #[rstest]
    fn first_report_is_cached(mut merger: VitalMerger) {
        assert!(merger.offer(vital(1_000, "72", "97")).is_none());
        assert_eq!(merger.pending().map(|v| v.timestamp), Some(1_000));
    }

    #[rstest]
    fn same_timestamp_merges_valid_values(mut merger: VitalMerger) {
        merger.offer(vital(1_000, "72", "-100"));
        assert!(merger.offer(vital(1_000, "-100", "98")).is_none());

        let merged = merger.flush().expect("pending");
        assert_eq!(merged.hr.as_deref(), Some("72"));
        assert_eq!(merged.spo2.as_deref(), Some("98"));
    }

    #[rstest]
    fn new_timestamp_flushes_previous(mut merger: VitalMerger) {
        merger.offer(vital(1_000, "72", "97"));
        let flushed = merger.offer(vital(2_000, "75", "96")).expect("flushed");
        assert_eq!(flushed.timestamp, 1_000);
        assert_eq!(flushed.hr.as_deref(), Some("72"));
        assert_eq!(merger.pending().map(|v| v.timestamp), Some(2_000));
    }

    #[rstest]
    fn empty_report_is_dropped(mut merger: VitalMerger) {
        merger.offer(vital(1_000, "72", "97"));
        assert!(merger.offer(VitalSign::default()).is_none());
        assert_eq!(merger.pending().and_then(|v| v.hr.as_deref()), Some("72"));
    }

    #[rstest]
    fn flush_empties_the_cache(mut merger: VitalMerger) {
        merger.offer(vital(1_000, "72", "97"));
        assert!(merger.flush().is_some());
        assert!(merger.flush().is_none());
    }
}
