//! Pipeline orchestrator
//!
//! Renders every view of a perspective set, runs the recognizer on each,
//! back-projects the flat detections and resolves duplicates around the
//! ring. Failures are isolated per view unless `abort_on_view_error` is set.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::dedup::DuplicationEngine;
use crate::detection::{OutputRecord, SphereDetection};
use crate::error::{PanoOcrError, Result};
use crate::panorama::{EquirectangularImage, PerspectiveImage, PerspectiveSet, SamplingMode};
use crate::vision::TextRecognizer;

/// Orchestrator switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub sampling: SamplingMode,
    /// Stop at the first failing view instead of skipping it
    pub abort_on_view_error: bool,
}

/// A view that produced no detections because a stage failed
#[derive(Debug)]
pub struct ViewFailure {
    pub view_index: usize,
    pub error: PanoOcrError,
}

/// Outcome of one pipeline run
#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Surviving detections, ordered by view then by recognizer order
    pub detections: Vec<SphereDetection>,
    pub failures: Vec<ViewFailure>,
    /// Flat detections dropped by back-projection validation
    pub rejected: Vec<PanoOcrError>,
    pub duplicates_removed: usize,
    /// Back-projected detections per view before deduplication
    pub detections_per_view: Vec<usize>,
}

impl PipelineReport {
    pub fn records(&self) -> Vec<OutputRecord> {
        self.detections.iter().map(SphereDetection::to_record).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PanoOcrPipeline {
    perspectives: PerspectiveSet,
    dedup: DuplicationEngine,
    options: PipelineOptions,
}

impl PanoOcrPipeline {
    pub fn new(perspectives: PerspectiveSet, dedup: DuplicationEngine, options: PipelineOptions) -> Self {
        Self {
            perspectives,
            dedup,
            options,
        }
    }

    /// Build a pipeline from the loaded configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let perspectives = config.perspectives.build()?;
        Ok(Self::new(
            perspectives,
            DuplicationEngine::new(config.dedup),
            PipelineOptions {
                sampling: config.perspectives.sampling,
                abort_on_view_error: config.pipeline.abort_on_view_error,
            },
        ))
    }

    pub fn perspectives(&self) -> &PerspectiveSet {
        &self.perspectives
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run<R: TextRecognizer + ?Sized>(
        &self,
        panorama: &EquirectangularImage,
        recognizer: &mut R,
    ) -> Result<PipelineReport> {
        self.run_with_inspector(panorama, recognizer, |_, _| Ok(()))
    }

    /// Run the pipeline, handing every rendered view to `inspect` before
    /// recognition (used to dump perspectives to disk)
    pub fn run_with_inspector<R, F>(
        &self,
        panorama: &EquirectangularImage,
        recognizer: &mut R,
        mut inspect: F,
    ) -> Result<PipelineReport>
    where
        R: TextRecognizer + ?Sized,
        F: FnMut(usize, &PerspectiveImage) -> Result<()>,
    {
        let start = Instant::now();
        let (width, height) = self.perspectives.resolution();
        info!(
            "Processing {}x{} panorama through {} views at {}x{} ({})",
            panorama.width(),
            panorama.height(),
            self.perspectives.len(),
            width,
            height,
            recognizer.engine_tag()
        );

        let mut report = PipelineReport::default();
        let mut per_view: Vec<Vec<SphereDetection>> = Vec::with_capacity(self.perspectives.len());

        for (view_index, camera) in self.perspectives.iter().enumerate() {
            let view_start = Instant::now();
            let outcome = self.process_view(panorama, recognizer, &mut inspect, view_index, camera, &mut report.rejected);

            match outcome {
                Ok(detections) => {
                    debug!(
                        "View {} produced {} detections in {:?}",
                        view_index,
                        detections.len(),
                        view_start.elapsed()
                    );
                    per_view.push(detections);
                }
                Err(e) if self.options.abort_on_view_error => return Err(e),
                Err(e) => {
                    warn!("Skipping view {}: {}", view_index, e);
                    report.failures.push(ViewFailure { view_index, error: e });
                    per_view.push(Vec::new());
                }
            }
        }

        report.detections_per_view = per_view.iter().map(Vec::len).collect();
        report.duplicates_removed = self.dedup.resolve_ring(&mut per_view);
        report.detections = per_view.into_iter().flatten().collect();

        info!(
            "Found {} detections ({} duplicates removed, {} rejected, {} failed views) in {:?}",
            report.detections.len(),
            report.duplicates_removed,
            report.rejected.len(),
            report.failures.len(),
            start.elapsed()
        );

        Ok(report)
    }

    fn process_view<R, F>(
        &self,
        panorama: &EquirectangularImage,
        recognizer: &mut R,
        inspect: &mut F,
        view_index: usize,
        camera: &crate::geometry::CameraSpec,
        rejected: &mut Vec<PanoOcrError>,
    ) -> Result<Vec<SphereDetection>>
    where
        R: TextRecognizer + ?Sized,
        F: FnMut(usize, &PerspectiveImage) -> Result<()>,
    {
        let (width, height) = self.perspectives.resolution();
        let view = panorama.render_perspective(camera, width, height, self.options.sampling)?;
        inspect(view_index, &view)?;

        let flat = recognizer
            .recognize(view.image())
            .map_err(|e| PanoOcrError::recognition(view_index, e))?;

        let mut detections = Vec::with_capacity(flat.len());
        for detection in flat {
            match detection.to_sphere(camera, view_index) {
                Ok(sphere) => detections.push(sphere),
                Err(e @ PanoOcrError::MalformedDetection { .. }) => {
                    if self.options.abort_on_view_error {
                        return Err(e);
                    }
                    warn!("View {}: {}", view_index, e);
                    rejected.push(e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::DedupConfig;
    use crate::detection::{FlatDetection, NormalizedBox};
    use crate::geometry::CameraSpec;
    use image::RgbImage;

    /// Returns the same scripted detections for every view
    struct ScriptedRecognizer {
        per_call: Vec<anyhow::Result<Vec<FlatDetection>>>,
        calls: usize,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn engine_tag(&self) -> &str {
            "SCRIPTED"
        }

        fn recognize(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<FlatDetection>> {
            let index = self.calls;
            self.calls += 1;
            match self.per_call.get(index) {
                Some(Ok(detections)) => Ok(detections.clone()),
                Some(Err(e)) => Err(anyhow::anyhow!("{}", e)),
                None => Ok(Vec::new()),
            }
        }
    }

    fn pipeline(cameras: Vec<CameraSpec>, abort: bool) -> PanoOcrPipeline {
        PanoOcrPipeline::new(
            PerspectiveSet::new(cameras, 32, 32).unwrap(),
            DuplicationEngine::new(DedupConfig::default()),
            PipelineOptions {
                sampling: SamplingMode::Nearest,
                abort_on_view_error: abort,
            },
        )
    }

    fn panorama() -> EquirectangularImage {
        EquirectangularImage::new(RgbImage::new(128, 64))
    }

    fn centered(text: &str) -> FlatDetection {
        FlatDetection::new(text, 0.9, NormalizedBox::from_edges(0.45, 0.45, 0.55, 0.55), "SCRIPTED")
    }

    #[test]
    fn test_failing_view_is_skipped() {
        let cameras = (0..4)
            .map(|i| CameraSpec::from_degrees(60.0, 60.0, i as f64 * 90.0 - 180.0, 0.0))
            .collect();
        let mut recognizer = ScriptedRecognizer {
            per_call: vec![
                Ok(vec![centered("A")]),
                Err(anyhow::anyhow!("engine crashed")),
                Ok(vec![centered("C")]),
                Ok(vec![centered("D")]),
            ],
            calls: 0,
        };

        let report = pipeline(cameras, false).run(&panorama(), &mut recognizer).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].view_index, 1);
        assert!(matches!(
            report.failures[0].error,
            PanoOcrError::RecognitionFailure { view_index: 1, .. }
        ));
        assert!(report.failures[0].error.to_string().contains("engine crashed"));

        let texts: Vec<&str> = report.detections.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "C", "D"]);
        assert_eq!(report.detections_per_view, vec![1, 0, 1, 1]);
    }

    #[test]
    fn test_abort_on_view_error() {
        let cameras = vec![
            CameraSpec::from_degrees(60.0, 60.0, 0.0, 0.0),
            CameraSpec::from_degrees(60.0, 60.0, 90.0, 0.0),
        ];
        let mut recognizer = ScriptedRecognizer {
            per_call: vec![Err(anyhow::anyhow!("boom"))],
            calls: 0,
        };
        let result = pipeline(cameras, true).run(&panorama(), &mut recognizer);
        assert!(matches!(result, Err(PanoOcrError::RecognitionFailure { view_index: 0, .. })));
        assert_eq!(recognizer.calls, 1);
    }

    #[test]
    fn test_malformed_detection_is_rejected() {
        let cameras = vec![CameraSpec::from_degrees(60.0, 60.0, 0.0, 0.0)];
        let mut bad_box = NormalizedBox::from_edges(0.2, 0.2, 0.4, 0.4);
        bad_box.bottom = 1.5;
        let mut recognizer = ScriptedRecognizer {
            per_call: vec![Ok(vec![
                FlatDetection::new("BAD", 0.9, bad_box, "SCRIPTED"),
                centered("GOOD"),
            ])],
            calls: 0,
        };

        let report = pipeline(cameras, false).run(&panorama(), &mut recognizer).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.detections[0].text, "GOOD");
    }

    #[test]
    fn test_inspector_sees_every_view() {
        let cameras = (0..3)
            .map(|i| CameraSpec::from_degrees(60.0, 60.0, i as f64 * 120.0, 0.0))
            .collect();
        let mut recognizer = ScriptedRecognizer {
            per_call: Vec::new(),
            calls: 0,
        };
        let mut seen = Vec::new();
        let report = pipeline(cameras, false)
            .run_with_inspector(&panorama(), &mut recognizer, |index, view| {
                assert_eq!(view.dimensions(), (32, 32));
                seen.push(index);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(report.detections.is_empty());
    }

    #[test]
    fn test_records_use_degrees() {
        let cameras = vec![CameraSpec::from_degrees(60.0, 60.0, 45.0, 0.0)];
        let mut recognizer = ScriptedRecognizer {
            per_call: vec![Ok(vec![centered("EXIT")])],
            calls: 0,
        };
        let report = pipeline(cameras, false).run(&panorama(), &mut recognizer).unwrap();
        let records = report.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].yaw_min < 45.0 && records[0].yaw_max > 45.0);
        assert_eq!(records[0].view_index, 0);
    }
}
