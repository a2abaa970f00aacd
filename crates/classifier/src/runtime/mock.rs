//! Deterministic in-process model for tests and dry runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{ModelRuntime, TensorShape};
use crate::buffer::{bytes_to_f32s, f32s_to_bytes};
use crate::{ClassifierError, Result};

/// Execution and release counters shared with the caller
#[derive(Debug, Default)]
pub struct MockStats {
    executions: AtomicUsize,
    releases: AtomicUsize,
}

impl MockStats {
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// Mock model: class `k` scores the mean of input elements at indices `i % n == k`,
/// plus a fixed bias.
#[derive(Debug)]
pub struct MockRuntime {
    inputs: Vec<TensorShape>,
    outputs: Vec<TensorShape>,
    bias: f32,
    stats: Arc<MockStats>,
}

impl MockRuntime {
    /// Create a mock with arbitrary declared shapes
    pub fn new(inputs: Vec<TensorShape>, outputs: Vec<TensorShape>) -> Self {
        Self {
            inputs,
            outputs,
            bias: 0.0,
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Image classifier shaped `[1, h, w, c] -> [1, classes]`
    pub fn image(height: i64, width: i64, channels: i64, classes: i64) -> Self {
        Self::new(
            vec![TensorShape::new(vec![1, height, width, channels])],
            vec![TensorShape::new(vec![1, classes])],
        )
    }

    pub fn with_bias(mut self, bias: f32) -> Self {
        self.bias = bias;
        self
    }

    /// Counters that outlive the runtime
    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }

    /// Scores this mock produces for `input`
    pub fn reference_scores(input: &[f32], classes: usize, bias: f32) -> Vec<f32> {
        let mut sums = vec![0.0f32; classes];
        let mut counts = vec![0usize; classes];
        for (i, value) in input.iter().enumerate() {
            sums[i % classes] += value;
            counts[i % classes] += 1;
        }
        sums.iter()
            .zip(&counts)
            .map(|(sum, &count)| if count == 0 { bias } else { sum / count as f32 + bias })
            .collect()
    }
}

impl ModelRuntime for MockRuntime {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn output_count(&self) -> usize {
        self.outputs.len()
    }

    fn input_shape(&self, index: usize) -> Option<TensorShape> {
        self.inputs.get(index).cloned()
    }

    fn output_shape(&self, index: usize) -> Option<TensorShape> {
        self.outputs.get(index).cloned()
    }

    fn execute(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let classes = output.len() / crate::FLOAT_BYTES;
        if classes == 0 {
            return Err(ClassifierError::Inference("empty output buffer".to_string()));
        }
        let scores = Self::reference_scores(&bytes_to_f32s(input), classes, self.bias);
        f32s_to_bytes(&scores, output);
        self.stats.executions.fetch_add(1, Ordering::SeqCst);
        debug!("Mock model executed ({} classes)", classes);
        Ok(())
    }
}

impl Drop for MockRuntime {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_scores() {
        let scores = MockRuntime::reference_scores(&[1.0, 10.0, 3.0, 20.0], 2, 0.5);
        assert_eq!(scores, vec![2.5, 15.5]);
    }

    #[test]
    fn test_release_counted_once() {
        let runtime = MockRuntime::image(2, 2, 1, 2);
        let stats = runtime.stats();
        drop(runtime);
        assert_eq!(stats.releases(), 1);
    }
}
