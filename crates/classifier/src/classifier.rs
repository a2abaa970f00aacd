//! Classifier Implementation

use std::time::Instant;

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::buffer::TensorBuffer;
use crate::config::{ClassifierConfig, UndersizedInputPolicy};
use crate::labels::{LabelMap, Prediction};
use crate::runtime::{ModelRuntime, TensorShape, TractRuntime};
use crate::{ClassifierError, Result};

/// Lifecycle state; a classifier only exists once construction succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierState {
    /// Model loaded, buffers allocated
    Ready,
    /// Model released
    Closed,
}

/// Single-image classifier over a pre-loaded model.
///
/// Owns the model handle and two buffers sized from the model's declared
/// shapes: `h*w*c*4` input bytes and `n*4` output bytes. Both are reused by
/// every call. `&mut self` on `classify` keeps at most one execution in flight.
pub struct Classifier<R: ModelRuntime = TractRuntime> {
    /// Model handle, `None` once closed
    runtime: Option<R>,
    input: TensorBuffer,
    output: TensorBuffer,
    input_shape: TensorShape,
    output_shape: TensorShape,
    config: ClassifierConfig,
}

impl<R: ModelRuntime> Classifier<R> {
    /// Read the model's tensor shapes and allocate the buffers
    pub fn new(runtime: R, config: ClassifierConfig) -> Result<Self> {
        if runtime.input_count() < 1 || runtime.output_count() < 1 {
            return Err(ClassifierError::Initialization(format!(
                "model needs at least one input and one output tensor, has {} and {}",
                runtime.input_count(),
                runtime.output_count()
            )));
        }

        let input_shape = runtime
            .input_shape(0)
            .ok_or_else(|| ClassifierError::Initialization("input shape unavailable".into()))?;
        let output_shape = runtime
            .output_shape(0)
            .ok_or_else(|| ClassifierError::Initialization("output shape unavailable".into()))?;

        input_shape.validate(4, "input")?;
        output_shape.validate(2, "output")?;

        let input = TensorBuffer::with_capacity(input_shape.sample_byte_len());
        let output = TensorBuffer::with_capacity(output_shape.sample_byte_len());

        info!(
            "Classifier ready: input={} ({} bytes), output={} ({} bytes), undersized={:?}",
            input_shape,
            input.capacity(),
            output_shape,
            output.capacity(),
            config.undersized_input
        );

        Ok(Self {
            runtime: Some(runtime),
            input,
            output,
            input_shape,
            output_shape,
            config,
        })
    }

    /// Run one classification and return the raw per-class scores
    pub fn classify(&mut self, pixels: &[u8]) -> Result<Vec<f32>> {
        let start = Instant::now();

        let runtime = self.runtime.as_mut().ok_or(ClassifierError::Closed)?;

        let expected = self.input.capacity();
        if pixels.len() < expected && self.config.undersized_input == UndersizedInputPolicy::Reject {
            return Err(ClassifierError::InputUnderflow {
                expected,
                actual: pixels.len(),
            });
        }

        self.input.rewind();
        self.input.put(pixels)?;
        if self.input.remaining() > 0 {
            debug!("Zero-filling {} trailing input bytes", self.input.remaining());
            self.input.zero_remaining();
        }

        self.output.rewind();
        runtime.execute(self.input.as_bytes(), self.output.as_mut_bytes())?;

        let scores = self.output.read_f32s();

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        counter!("classifier_classifications_total").increment(1);
        histogram!("classifier_latency_ms").record(latency_ms);
        debug!("Classification completed in {:.2}ms ({} scores)", latency_ms, scores.len());

        Ok(scores)
    }

    /// Classify and pick the best class
    pub fn predict(&mut self, pixels: &[u8], labels: &LabelMap) -> Result<Prediction> {
        let scores = self.classify(pixels)?;
        Prediction::from_scores(scores, labels, self.config.top_k)
            .ok_or_else(|| ClassifierError::Inference("model produced no comparable score".into()))
    }

    /// Release the model; later calls fail with `Closed`
    pub fn close(&mut self) {
        match self.runtime.take() {
            Some(runtime) => {
                drop(runtime);
                info!("Classifier closed");
            }
            None => warn!("Classifier already closed"),
        }
    }

    pub fn state(&self) -> ClassifierState {
        if self.runtime.is_some() {
            ClassifierState::Ready
        } else {
            ClassifierState::Closed
        }
    }

    pub fn input_shape(&self) -> &TensorShape {
        &self.input_shape
    }

    pub fn output_shape(&self) -> &TensorShape {
        &self.output_shape
    }

    /// Input buffer size in bytes
    pub fn input_capacity(&self) -> usize {
        self.input.capacity()
    }

    /// Output buffer size in bytes
    pub fn output_capacity(&self) -> usize {
        self.output.capacity()
    }

    /// Number of classes the model scores
    pub fn num_classes(&self) -> usize {
        self.output_shape.sample_elements()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::f32s_to_bytes;
    use crate::runtime::MockRuntime;
    use proptest::prelude::*;

    fn pixel_bytes(values: &[f32]) -> Vec<u8> {
        let mut bytes = vec![0u8; values.len() * 4];
        f32s_to_bytes(values, &mut bytes);
        bytes
    }

    #[test]
    fn test_buffer_sizes() {
        let classifier = Classifier::new(MockRuntime::image(4, 5, 3, 10), ClassifierConfig::default()).unwrap();
        assert_eq!(classifier.input_capacity(), 4 * 5 * 3 * 4);
        assert_eq!(classifier.output_capacity(), 10 * 4);
        assert_eq!(classifier.num_classes(), 10);
        assert_eq!(classifier.state(), ClassifierState::Ready);
    }

    #[test]
    fn test_missing_tensors() {
        let runtime = MockRuntime::new(vec![], vec![TensorShape::new(vec![1, 2])]);
        let err = Classifier::new(runtime, ClassifierConfig::default()).err().unwrap();
        assert!(matches!(err, ClassifierError::Initialization(_)));

        let runtime = MockRuntime::new(vec![TensorShape::new(vec![1, 2, 2, 1])], vec![]);
        assert!(Classifier::new(runtime, ClassifierConfig::default()).is_err());
    }

    #[test]
    fn test_non_positive_dims() {
        let err = Classifier::new(MockRuntime::image(0, 4, 3, 2), ClassifierConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::Initialization(_)));

        let err = Classifier::new(MockRuntime::image(4, 4, 3, -1), ClassifierConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ClassifierError::Initialization(_)));
    }

    #[test]
    fn test_classify_matches_reference() {
        let runtime = MockRuntime::image(2, 2, 1, 2).with_bias(0.25);
        let mut classifier = Classifier::new(runtime, ClassifierConfig::default()).unwrap();

        let input = [1.0, 2.0, 3.0, 4.0];
        let scores = classifier.classify(&pixel_bytes(&input)).unwrap();
        assert_eq!(scores, MockRuntime::reference_scores(&input, 2, 0.25));
        assert_eq!(scores, vec![2.25, 3.25]);
    }

    #[test]
    fn test_overflow_rejected() {
        let runtime = MockRuntime::image(2, 2, 1, 2);
        let stats = runtime.stats();
        let mut classifier = Classifier::new(runtime, ClassifierConfig::default()).unwrap();

        let err = classifier.classify(&[0u8; 17]).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::BufferOverflow { capacity: 16, attempted: 17 }
        ));
        assert_eq!(stats.executions(), 0);
    }

    #[test]
    fn test_undersized_rejected_by_default() {
        let mut classifier = Classifier::new(MockRuntime::image(2, 2, 1, 2), ClassifierConfig::strict()).unwrap();
        let err = classifier.classify(&pixel_bytes(&[1.0, 2.0])).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::InputUnderflow { expected: 16, actual: 8 }
        ));
    }

    #[test]
    fn test_undersized_zero_filled() {
        let mut classifier = Classifier::new(MockRuntime::image(2, 2, 1, 2), ClassifierConfig::lenient()).unwrap();

        classifier.classify(&pixel_bytes(&[9.0, 9.0, 9.0, 9.0])).unwrap();
        let scores = classifier.classify(&pixel_bytes(&[2.0, 4.0])).unwrap();

        // stale 9.0s must not leak into the second call
        assert_eq!(scores, MockRuntime::reference_scores(&[2.0, 4.0, 0.0, 0.0], 2, 0.0));
    }

    #[test]
    fn test_sequential_calls_independent() {
        let mut classifier = Classifier::new(MockRuntime::image(1, 2, 2, 2), ClassifierConfig::default()).unwrap();

        let first = [1.0, 1.0, 1.0, 1.0];
        let second = [0.0, 8.0, 2.0, 4.0];
        let a = classifier.classify(&pixel_bytes(&first)).unwrap();
        let b = classifier.classify(&pixel_bytes(&second)).unwrap();

        assert_eq!(a, MockRuntime::reference_scores(&first, 2, 0.0));
        assert_eq!(b, MockRuntime::reference_scores(&second, 2, 0.0));
    }

    #[test]
    fn test_closed_classifier() {
        let runtime = MockRuntime::image(1, 1, 1, 1);
        let stats = runtime.stats();
        let mut classifier = Classifier::new(runtime, ClassifierConfig::default()).unwrap();

        classifier.close();
        classifier.close();
        assert_eq!(stats.releases(), 1);
        assert_eq!(classifier.state(), ClassifierState::Closed);

        let err = classifier.classify(&pixel_bytes(&[1.0])).unwrap_err();
        assert!(matches!(err, ClassifierError::Closed));
        assert_eq!(stats.executions(), 0);

        drop(classifier);
        assert_eq!(stats.releases(), 1);
    }

    #[test]
    fn test_drop_releases_runtime() {
        let runtime = MockRuntime::image(1, 1, 1, 1);
        let stats = runtime.stats();
        let classifier = Classifier::new(runtime, ClassifierConfig::default()).unwrap();
        drop(classifier);
        assert_eq!(stats.releases(), 1);
    }

    #[test]
    fn test_predict_labels() {
        let mut classifier = Classifier::new(MockRuntime::image(1, 1, 3, 3), ClassifierConfig::default()).unwrap();
        let labels = LabelMap::parse("cat\ndog\nbird");
        let prediction = classifier.predict(&pixel_bytes(&[0.1, 0.9, 0.3]), &labels).unwrap();
        assert_eq!(prediction.index, 1);
        assert_eq!(prediction.label, "dog");
        assert_eq!(prediction.ranked.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_buffers_sized_from_shapes(h in 1i64..32, w in 1i64..32, c in 1i64..5, n in 1i64..100) {
            let classifier = Classifier::new(MockRuntime::image(h, w, c, n), ClassifierConfig::default()).unwrap();
            prop_assert_eq!(classifier.input_capacity(), (h * w * c * 4) as usize);
            prop_assert_eq!(classifier.output_capacity(), (n * 4) as usize);
        }
    }
}
