//! Image Classifier
//!
//! Runs one model execution per image over pre-allocated, native-order tensor
//! buffers. The model itself is an opaque ONNX artifact executed with tract.

mod buffer;
mod classifier;
pub mod config;
pub mod labels;
mod loader;
pub mod runtime;
mod worker;

pub use buffer::TensorBuffer;
pub use classifier::{Classifier, ClassifierState};
pub use config::{ClassifierConfig, UndersizedInputPolicy};
pub use labels::{argmax, top_k, LabelMap, Prediction};
pub use loader::{ModelLoader, DEFAULT_MODEL_NAME};
pub use runtime::{MockRuntime, MockStats, ModelRuntime, TensorShape, TractRuntime};
pub use worker::ClassifierWorker;

use thiserror::Error;

/// Size of one f32 tensor element in bytes
pub const FLOAT_BYTES: usize = 4;

/// Errors raised by the classifier and its collaborators
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Initialization failed: {0}")]
    Initialization(String),
    #[error("Buffer overflow: {attempted} bytes do not fit in {capacity} byte buffer")]
    BufferOverflow { capacity: usize, attempted: usize },
    #[error("Input underflow: expected {expected} bytes, got {actual}")]
    InputUnderflow { expected: usize, actual: usize },
    #[error("Classifier is closed")]
    Closed,
    #[error("Model load failed: {0}")]
    ModelLoad(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
