//! Application state.

use std::sync::Arc;

use framewire_vision::{FrameProcessor, VisionConfig, VisionResult};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub processor: Arc<FrameProcessor>,
}

impl AppState {
    /// Wrap an already constructed processor.
    pub fn new(config: ApiConfig, processor: FrameProcessor) -> Self {
        Self {
            config,
            processor: Arc::new(processor),
        }
    }

    /// Load the detection model described by `vision` and build the state.
    pub fn load(config: ApiConfig, vision: &VisionConfig) -> VisionResult<Self> {
        let processor = FrameProcessor::from_config(vision)?;
        Ok(Self::new(config, processor))
    }
}
