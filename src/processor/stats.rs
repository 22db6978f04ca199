// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Outcome, ProcessingResult, ProcessingStage};

/// One image that ended in error
#[derive(Debug, Clone, Serialize)]
pub struct ImageFailure {
    pub image_key: String,
    pub file_name: String,
    pub stage: ProcessingStage,
    pub message: String,
}

/// Summary of an album run
#[derive(Debug, Clone, Serialize)]
pub struct BatchStats {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Images left untouched after the batch was aborted
    pub not_attempted: usize,
    pub faces_detected: usize,
    pub people_identified: usize,
    pub locations_resolved: usize,
    pub failures: Vec<ImageFailure>,
    pub aborted: Option<String>,
    pub results: Vec<ProcessingResult>,
}

impl BatchStats {
    pub fn new(dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            total: 0,
            processed: 0,
            skipped: 0,
            errored: 0,
            not_attempted: 0,
            faces_detected: 0,
            people_identified: 0,
            locations_resolved: 0,
            failures: Vec::new(),
            aborted: None,
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, result: &ProcessingResult) {
        self.total += 1;
        match &result.outcome {
            Outcome::Processed { .. } => self.processed += 1,
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Errored { stage, message } => {
                self.errored += 1;
                self.failures.push(ImageFailure {
                    image_key: result.image_key.clone(),
                    file_name: result.file_name.clone(),
                    stage: *stage,
                    message: message.clone(),
                });
            }
        }
        self.faces_detected += result.faces_detected;
        self.people_identified += result.people.len();
        if result.location.as_ref().is_some_and(|l| l.resolved_name().is_some()) {
            self.locations_resolved += 1;
        }
        self.results.push(result.clone());
    }

    pub fn abort(&mut self, reason: String, remaining: usize) {
        self.aborted = Some(reason);
        self.not_attempted = remaining;
        self.total += remaining;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    /// Processed share of the images that were attempted
    pub fn success_rate(&self) -> f64 {
        let attempted = self.processed + self.errored;
        if attempted == 0 {
            return 0.0;
        }
        self.processed as f64 / attempted as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::SkipReason;

    fn result(outcome: Outcome) -> ProcessingResult {
        ProcessingResult {
            image_key: "k".into(),
            file_name: "f.jpg".into(),
            stages: vec![ProcessingStage::Unprocessed],
            outcome,
            existing_caption: None,
            existing_keywords: Vec::new(),
            proposed: None,
            location: None,
            people: vec!["Ann".into()],
            faces_detected: 2,
            ai_tags: 0,
            elapsed_ms: 5,
            fatal: false,
        }
    }

    #[test]
    fn test_record_and_rate() {
        let mut stats = BatchStats::new(false);
        stats.record(&result(Outcome::Processed { written: true }));
        stats.record(&result(Outcome::Skipped { reason: SkipReason::Video }));
        stats.record(&result(Outcome::Errored {
            stage: ProcessingStage::Downloading,
            message: "gone".into(),
        }));
        stats.abort("auth".into(), 4);
        stats.finish();

        assert_eq!(stats.total, 7);
        assert_eq!((stats.processed, stats.skipped, stats.errored), (1, 1, 1));
        assert_eq!(stats.not_attempted, 4);
        assert_eq!(stats.faces_detected, 6);
        assert_eq!(stats.failures[0].stage, ProcessingStage::Downloading);
        assert!((stats.success_rate() - 50.0).abs() < 1e-9);
        assert!(stats.duration_secs() >= 0.0);
    }
}
