//! Cross-view duplicate resolution
//!
//! Adjacent perspective views overlap, so the same sign is often read twice.
//! Two detections from neighbouring views are duplicates when their
//! normalized texts agree and their spherical regions overlap by more than
//! the IoU threshold. The lower-confidence member of each duplicate pair is
//! dropped; ties keep the member of the first list.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::detection::SphereDetection;
use crate::panorama::ring_pairs;

/// Matching thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum spherical IoU (exclusive) for two detections to be the same text
    pub iou_threshold: f64,
    /// Required text similarity after normalization (1.0 = exact match)
    pub text_similarity: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            text_similarity: 1.0,
        }
    }
}

/// Case-insensitive, whitespace-collapsed form used for text matching
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolves duplicate detections between pairs of neighbouring views
#[derive(Debug, Clone, Default)]
pub struct DuplicationEngine {
    config: DedupConfig,
}

impl DuplicationEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Compare two already-normalized texts
    fn normalized_texts_match(&self, a: &str, b: &str) -> bool {
        if self.config.text_similarity >= 1.0 {
            a == b
        } else {
            a == b || normalized_levenshtein(a, b) >= self.config.text_similarity
        }
    }

    pub fn texts_match(&self, a: &str, b: &str) -> bool {
        self.normalized_texts_match(&normalize_text(a), &normalize_text(b))
    }

    /// Resolve duplicates between the detections of two adjacent views.
    ///
    /// Candidate pairs are resolved highest IoU first, with index order as
    /// the tie-break. Within a round a detection takes part in at most one
    /// decision; rounds repeat over the survivors until no candidate pair is
    /// left, so resolving an already-resolved pair of lists removes nothing.
    /// A consequence is that one detection can eliminate several matches in
    /// the other list across rounds, rather than leaving the later matches
    /// untouched. Survivors keep their relative order.
    pub fn resolve_pair(
        &self,
        list_a: Vec<SphereDetection>,
        list_b: Vec<SphereDetection>,
    ) -> (Vec<SphereDetection>, Vec<SphereDetection>) {
        let texts_a: Vec<String> = list_a.iter().map(|d| normalize_text(&d.text)).collect();
        let texts_b: Vec<String> = list_b.iter().map(|d| normalize_text(&d.text)).collect();

        let mut keep_a = vec![true; list_a.len()];
        let mut keep_b = vec![true; list_b.len()];
        let mut removed = 0usize;

        loop {
            let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
            for (i, a) in list_a.iter().enumerate() {
                if !keep_a[i] {
                    continue;
                }
                for (j, b) in list_b.iter().enumerate() {
                    if !keep_b[j] || !self.normalized_texts_match(&texts_a[i], &texts_b[j]) {
                        continue;
                    }
                    let iou = a.region.iou(&b.region);
                    if iou > self.config.iou_threshold {
                        candidates.push((iou, i, j));
                    }
                }
            }

            if candidates.is_empty() {
                break;
            }

            candidates.sort_by(|x, y| {
                y.0.total_cmp(&x.0)
                    .then(x.1.cmp(&y.1))
                    .then(x.2.cmp(&y.2))
            });

            let mut decided_a = vec![false; list_a.len()];
            let mut decided_b = vec![false; list_b.len()];
            for (iou, i, j) in candidates {
                if decided_a[i] || decided_b[j] {
                    continue;
                }
                decided_a[i] = true;
                decided_b[j] = true;

                if list_b[j].confidence > list_a[i].confidence {
                    keep_a[i] = false;
                } else {
                    keep_b[j] = false;
                }
                removed += 1;
                debug!(
                    "Duplicate '{}' (view {} vs view {}, IoU {:.3})",
                    list_a[i].text, list_a[i].view_index, list_b[j].view_index, iou
                );
            }
        }

        if removed > 0 {
            debug!("Removed {} duplicate detections", removed);
        }

        (retain_flagged(list_a, &keep_a), retain_flagged(list_b, &keep_b))
    }

    /// Resolve every adjacent pair of a ring of per-view detection lists, in
    /// view order. Returns the number of detections removed.
    pub fn resolve_ring(&self, views: &mut [Vec<SphereDetection>]) -> usize {
        let before: usize = views.iter().map(Vec::len).sum();

        for (first, second) in ring_pairs(views.len()) {
            let list_a = std::mem::take(&mut views[first]);
            let list_b = std::mem::take(&mut views[second]);
            let (list_a, list_b) = self.resolve_pair(list_a, list_b);
            views[first] = list_a;
            views[second] = list_b;
        }

        let after: usize = views.iter().map(Vec::len).sum();
        before - after
    }
}

fn retain_flagged(items: Vec<SphereDetection>, keep: &[bool]) -> Vec<SphereDetection> {
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, &keep)| keep.then_some(item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SphereRegion;

    fn region(yaw_min: f64, yaw_max: f64) -> SphereRegion {
        SphereRegion::new(yaw_min.to_radians(), yaw_max.to_radians(), 0.0, 0.1)
    }

    fn det(text: &str, confidence: f32, region: SphereRegion, view_index: usize) -> SphereDetection {
        SphereDetection {
            text: text.to_string(),
            confidence,
            engine_tag: "TEST".to_string(),
            region,
            view_index,
        }
    }

    fn texts(list: &[SphereDetection]) -> Vec<(&str, f32)> {
        list.iter().map(|d| (d.text.as_str(), d.confidence)).collect()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Emergency \t EXIT\n"), "emergency exit");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_lower_confidence_is_dropped() {
        let engine = DuplicationEngine::default();
        let a = vec![det("EXIT", 0.6, region(10.0, 20.0), 0)];
        let b = vec![det("exit", 0.9, region(11.0, 21.0), 1)];
        let (a, b) = engine.resolve_pair(a, b);
        assert!(a.is_empty());
        assert_eq!(texts(&b), vec![("exit", 0.9)]);
    }

    #[test]
    fn test_tie_keeps_first_list() {
        let engine = DuplicationEngine::default();
        for _ in 0..10 {
            let a = vec![det("EXIT", 0.8, region(10.0, 20.0), 0)];
            let b = vec![det("EXIT", 0.8, region(10.0, 20.0), 1)];
            let (a, b) = engine.resolve_pair(a, b);
            assert_eq!(a.len(), 1);
            assert_eq!(a[0].view_index, 0);
            assert!(b.is_empty());
        }
    }

    #[test]
    fn test_text_mismatch_passes_through() {
        let engine = DuplicationEngine::default();
        let a = vec![det("EXIT", 0.5, region(10.0, 20.0), 0)];
        let b = vec![det("ENTRANCE", 0.9, region(10.0, 20.0), 1)];
        let (a, b) = engine.resolve_pair(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_low_overlap_passes_through() {
        let engine = DuplicationEngine::default();
        // IoU = 2 / 18
        let a = vec![det("EXIT", 0.5, region(10.0, 20.0), 0)];
        let b = vec![det("EXIT", 0.9, region(18.0, 28.0), 1)];
        let (a, b) = engine.resolve_pair(a, b);
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_highest_overlap_wins_and_order_is_preserved() {
        let engine = DuplicationEngine::default();
        let a = vec![
            det("OPEN", 0.9, region(-50.0, -40.0), 0),
            det("EXIT", 0.9, region(10.0, 20.0), 0),
            det("CAFE", 0.9, region(40.0, 50.0), 0),
        ];
        let b = vec![
            det("EXIT", 0.5, region(14.0, 24.0), 1),
            det("EXIT", 0.5, region(10.5, 20.5), 1),
            det("SHOP", 0.5, region(60.0, 70.0), 1),
        ];
        let (a, b) = engine.resolve_pair(a, b);
        assert_eq!(texts(&a), vec![("OPEN", 0.9), ("EXIT", 0.9), ("CAFE", 0.9)]);
        // the closer match goes first; the weaker one follows in a later round
        assert_eq!(texts(&b), vec![("SHOP", 0.5)]);
    }

    #[test]
    fn test_single_round_prefers_highest_iou_partner() {
        let engine = DuplicationEngine::default();
        let a = vec![det("EXIT", 0.4, region(10.0, 20.0), 0)];
        let b = vec![
            det("EXIT", 0.9, region(14.0, 24.0), 1),
            det("EXIT", 0.6, region(10.5, 20.5), 1),
        ];
        let (a, b) = engine.resolve_pair(a, b);
        // a loses to its best partner (index 1) and is gone before the second candidate is considered
        assert!(a.is_empty());
        assert_eq!(texts(&b), vec![("EXIT", 0.9), ("EXIT", 0.6)]);
    }

    #[test]
    fn test_strong_detection_removes_every_weaker_match() {
        let engine = DuplicationEngine::default();
        let a = vec![det("EXIT", 0.9, region(10.0, 20.0), 0)];
        let b = vec![
            det("EXIT", 0.5, region(10.5, 20.5), 1),
            det("EXIT", 0.4, region(12.0, 22.0), 1),
        ];
        let (a, b) = engine.resolve_pair(a, b);
        assert_eq!(texts(&a), vec![("EXIT", 0.9)]);
        assert!(b.is_empty());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let engine = DuplicationEngine::default();
        let a = vec![
            det("EXIT", 0.9, region(10.0, 20.0), 0),
            det("EXIT", 0.3, region(30.0, 40.0), 0),
            det("PUSH", 0.7, region(0.0, 5.0), 0),
        ];
        let b = vec![
            det("EXIT", 0.5, region(11.0, 21.0), 1),
            det("exit ", 0.8, region(30.5, 40.5), 1),
            det("EXIT", 0.8, region(12.0, 22.0), 1),
        ];
        let (a1, b1) = engine.resolve_pair(a, b);
        let (a2, b2) = engine.resolve_pair(a1.clone(), b1.clone());
        assert_eq!(a1, a2);
        assert_eq!(b1, b2);
    }

    #[test]
    fn test_fuzzy_similarity() {
        let engine = DuplicationEngine::new(DedupConfig {
            text_similarity: 0.75,
            ..DedupConfig::default()
        });
        assert!(engine.texts_match("EXIT", "EX1T"));
        assert!(!engine.texts_match("EXIT", "OPEN"));

        let exact = DuplicationEngine::default();
        assert!(!exact.texts_match("EXIT", "EX1T"));
    }

    #[test]
    fn test_resolve_ring_covers_wraparound_pair() {
        let engine = DuplicationEngine::default();
        let mut views = vec![
            vec![det("EXIT", 0.9, region(-5.0, 5.0), 0)],
            vec![],
            vec![],
            vec![det("EXIT", 0.7, region(-4.0, 6.0), 3)],
        ];
        let removed = engine.resolve_ring(&mut views);
        assert_eq!(removed, 1);
        assert_eq!(views[0].len(), 1);
        assert!(views[3].is_empty());
    }
}
