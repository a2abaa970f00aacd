//! Model runtime abstraction
//!
//! A runtime is the opaque, pre-loaded model handle the classifier drives:
//! it reports its tensor shapes and executes once per call. Releasing the
//! handle is its `Drop`.

mod mock;
mod tract;

pub use mock::{MockRuntime, MockStats};
pub use tract::TractRuntime;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ClassifierError, Result, FLOAT_BYTES};

/// Declared dimensions of a model tensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorShape(Vec<i64>);

impl TensorShape {
    pub fn new(dims: impl Into<Vec<i64>>) -> Self {
        Self(dims.into())
    }

    pub fn dims(&self) -> &[i64] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Check rank and that every dimension is positive
    pub fn validate(&self, rank: usize, name: &str) -> Result<()> {
        if self.rank() != rank {
            return Err(ClassifierError::Initialization(format!(
                "{} tensor must have rank {}, got shape {}",
                name, rank, self
            )));
        }
        if let Some(bad) = self.0.iter().find(|&&d| d <= 0) {
            return Err(ClassifierError::Initialization(format!(
                "{} tensor has non-positive dimension {} in shape {}",
                name, bad, self
            )));
        }
        Ok(())
    }

    /// Number of elements, excluding the leading batch axis
    pub fn sample_elements(&self) -> usize {
        self.0.iter().skip(1).map(|&d| d.max(0) as usize).product()
    }

    /// Byte length of one f32 sample
    pub fn sample_byte_len(&self) -> usize {
        self.sample_elements() * FLOAT_BYTES
    }

    /// Dimensions as `usize`, with the batch axis pinned to 1
    pub fn single_batch_dims(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .map(|(axis, &d)| if axis == 0 { 1 } else { d.max(0) as usize })
            .collect()
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", dims.join(", "))
    }
}

/// A loaded model that can be executed synchronously
pub trait ModelRuntime: Send {
    /// Number of input tensors
    fn input_count(&self) -> usize;

    /// Number of output tensors
    fn output_count(&self) -> usize;

    /// Declared shape of input tensor `index`
    fn input_shape(&self, index: usize) -> Option<TensorShape>;

    /// Declared shape of output tensor `index`
    fn output_shape(&self, index: usize) -> Option<TensorShape>;

    /// Run the model once.
    ///
    /// `input` and `output` hold native-order f32 values and are exactly the
    /// byte length of the first input and output tensor.
    fn execute(&mut self, input: &[u8], output: &mut [u8]) -> Result<()>;
}

impl<R: ModelRuntime + ?Sized> ModelRuntime for Box<R> {
    fn input_count(&self) -> usize {
        (**self).input_count()
    }

    fn output_count(&self) -> usize {
        (**self).output_count()
    }

    fn input_shape(&self, index: usize) -> Option<TensorShape> {
        (**self).input_shape(index)
    }

    fn output_shape(&self, index: usize) -> Option<TensorShape> {
        (**self).output_shape(index)
    }

    fn execute(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        (**self).execute(input, output)
    }
}
