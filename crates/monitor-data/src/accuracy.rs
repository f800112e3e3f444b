//! Detection accuracy over benchmark traffic.
//!
//! Only events that carry a ground-truth label (`expected_flagged`) count.
//! Live traffic without labels leaves the report empty.

use monitor_core::models::DetectionEvent;

/// Confusion matrix of the backend's `flagged` verdict against ground truth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccuracyReport {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl AccuracyReport {
    /// Build a report from `events`, or `None` when no event is labelled.
    pub fn from_events<'a, I>(events: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a DetectionEvent>,
    {
        let mut report = Self::default();
        for event in events {
            report.record(event);
        }
        (report.labelled() > 0).then_some(report)
    }

    /// Count `event` if it is labelled; unlabelled events are ignored.
    pub fn record(&mut self, event: &DetectionEvent) {
        let Some(expected) = event.expected_flagged else {
            return;
        };
        match (event.flagged, expected) {
            (true, true) => self.true_positives += 1,
            (true, false) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (false, true) => self.false_negatives += 1,
        }
    }

    /// Number of labelled events seen.
    pub fn labelled(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.labelled())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    /// Harmonic mean of precision and recall; `0` when both are `0`.
    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
