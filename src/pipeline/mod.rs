pub mod camera;
pub mod compositor;
pub mod controller;
pub mod credit;
pub mod face_mesh;
pub mod filter;
pub mod inference;
pub mod layers;
pub mod overlay;
pub mod raster;
#[cfg(test)]
mod recording;
pub mod rgba_converter;
pub mod skeleton;
pub mod surface;

// Re-exports for convenience
pub use camera::{CameraDevice, available_cameras};
pub use controller::{EngineSource, PipelineConfig, PipelineHandle, PipelineMode, start_pipeline};
pub use face_mesh::FaceMesh;
pub use inference::InferenceOptions;
