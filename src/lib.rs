//! PanoOCR - text extraction from 360° equirectangular panoramas
//!
//! The panorama is rendered into a ring of overlapping perspective views,
//! each view is read by a [`vision::TextRecognizer`], the flat detections
//! are projected back onto the sphere and duplicates seen by neighbouring
//! views are merged.

pub mod config;
pub mod dedup;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod panorama;
pub mod pipeline;
pub mod storage;
pub mod vision;

pub use dedup::{DedupConfig, DuplicationEngine};
pub use detection::{FlatDetection, NormalizedBox, OutputRecord, SphereDetection};
pub use error::{PanoOcrError, Result};
pub use geometry::{CameraSpec, SphereRegion};
pub use panorama::{EquirectangularImage, PerspectiveImage, PerspectivePreset, PerspectiveSet, SamplingMode};
pub use pipeline::{PanoOcrPipeline, PipelineOptions, PipelineReport};
pub use vision::TextRecognizer;
