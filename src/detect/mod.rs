//! Detection: backend contract, adapter, filtering and the detection model.

mod adapter;
mod backend;
pub mod backends;
mod classes;
mod filter;
mod registry;
mod result;

pub use adapter::{share, DetectionAdapter, SharedBackend};
pub use backend::{BackendError, InferenceBackend};
pub use backends::StubBackend;
pub use classes::{ClassSet, COCO_CLASSES};
pub use filter::{filter_detections, DetectionThreshold};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, ContractViolation, Detection, RawDetection};
