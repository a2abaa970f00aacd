//! ONNX runtime backed by tract

use std::io::Cursor;
use std::path::Path;

use tract_core::prelude::{Graph, SimplePlan, TypedFact, TypedOp};
use tract_onnx::prelude::*;
use tracing::{debug, info};

use super::{ModelRuntime, TensorShape};
use crate::buffer::{bytes_to_f32s, f32s_to_bytes};
use crate::{ClassifierError, Result};

type RunnablePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Optimised, runnable ONNX model
pub struct TractRuntime {
    plan: RunnablePlan,
    input_shapes: Vec<TensorShape>,
    output_shapes: Vec<TensorShape>,
}

impl std::fmt::Debug for TractRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractRuntime")
            .field("input_shapes", &self.input_shapes)
            .field("output_shapes", &self.output_shapes)
            .finish()
    }
}

fn load_error(e: impl std::fmt::Display) -> ClassifierError {
    ClassifierError::ModelLoad(e.to_string())
}

impl TractRuntime {
    /// Load an ONNX model from a file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading ONNX model from {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Load an ONNX model from its serialized bytes.
    ///
    /// The batch axis of the first input is pinned to 1, whether the model
    /// declares it symbolic or fixed; declared output shapes are re-inferred.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(bytes))
            .map_err(load_error)?;

        if model.inputs.is_empty() || model.outputs.is_empty() {
            return Err(ClassifierError::Initialization(format!(
                "model declares {} inputs and {} outputs",
                model.inputs.len(),
                model.outputs.len()
            )));
        }

        let declared = model.clone().into_typed().map_err(load_error)?;
        let (declared_batch, input_dims) = single_batch_input_dims(&declared)?;
        debug!("Declared batch {:?}, input dims {:?}", declared_batch, input_dims);

        let shape: TVec<usize> = input_dims.iter().copied().collect();
        let mut pinned = model
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), shape))
            .map_err(load_error)?;
        for output in 0..pinned.outputs.len() {
            pinned
                .set_output_fact(output, InferenceFact::default())
                .map_err(load_error)?;
        }

        let optimized = pinned.into_optimized().map_err(|e| {
            match declared_batch {
                Some(batch) if batch != 1 => ClassifierError::Initialization(format!(
                    "model with fixed batch {} cannot run a single image: {}",
                    batch, e
                )),
                _ => load_error(e),
            }
        })?;

        let input_shapes = collect_shapes(optimized.inputs.len(), |i| optimized.input_fact(i))?;
        let output_shapes = collect_shapes(optimized.outputs.len(), |i| optimized.output_fact(i))?;

        let plan = optimized.into_runnable().map_err(load_error)?;

        info!(
            "ONNX model ready: inputs={:?} outputs={:?}",
            input_shapes.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            output_shapes.iter().map(|s| s.to_string()).collect::<Vec<_>>()
        );

        Ok(Self {
            plan,
            input_shapes,
            output_shapes,
        })
    }
}

/// Fixed batch of the first input (`None` when symbolic) and its dimensions
/// with the batch axis set to 1
fn single_batch_input_dims(model: &TypedModel) -> Result<(Option<i64>, Vec<usize>)> {
    let fact = model.input_fact(0).map_err(load_error)?;
    let mut declared_batch = None;
    let dims = fact
        .shape
        .iter()
        .enumerate()
        .map(|(axis, dim)| {
            if axis == 0 {
                declared_batch = dim.to_i64().ok();
                return Ok(1);
            }
            match dim.to_i64() {
                Ok(d) if d > 0 => Ok(d as usize),
                Ok(d) => Err(ClassifierError::Initialization(format!(
                    "input axis {} has non-positive dimension {}",
                    axis, d
                ))),
                Err(_) => Err(ClassifierError::Initialization(format!(
                    "input axis {} is symbolic ({})",
                    axis, dim
                ))),
            }
        })
        .collect::<Result<Vec<usize>>>()?;
    Ok((declared_batch, dims))
}

fn collect_shapes<'a>(
    count: usize,
    fact: impl Fn(usize) -> TractResult<&'a TypedFact>,
) -> Result<Vec<TensorShape>> {
    (0..count)
        .map(|i| {
            let fact = fact(i).map_err(load_error)?;
            let dims: Vec<i64> = fact
                .shape
                .iter()
                .map(|d| d.to_i64().unwrap_or(-1))
                .collect();
            Ok(TensorShape::new(dims))
        })
        .collect()
}

impl ModelRuntime for TractRuntime {
    fn input_count(&self) -> usize {
        self.input_shapes.len()
    }

    fn output_count(&self) -> usize {
        self.output_shapes.len()
    }

    fn input_shape(&self, index: usize) -> Option<TensorShape> {
        self.input_shapes.get(index).cloned()
    }

    fn output_shape(&self, index: usize) -> Option<TensorShape> {
        self.output_shapes.get(index).cloned()
    }

    fn execute(&mut self, input: &[u8], output: &mut [u8]) -> Result<()> {
        let inference_error = |e: TractError| ClassifierError::Inference(e.to_string());

        let dims = self.input_shapes[0].single_batch_dims();
        let values = bytes_to_f32s(input);
        let tensor = Tensor::from_shape(&dims, &values).map_err(inference_error)?;

        let outputs = self.plan.run(tvec!(tensor.into())).map_err(inference_error)?;
        let scores = outputs[0].cast_to::<f32>().map_err(inference_error)?;
        let scores = scores.as_slice::<f32>().map_err(inference_error)?;

        if scores.len() * crate::FLOAT_BYTES != output.len() {
            return Err(ClassifierError::Inference(format!(
                "model produced {} scores, output buffer holds {}",
                scores.len(),
                output.len() / crate::FLOAT_BYTES
            )));
        }
        f32s_to_bytes(scores, output);
        Ok(())
    }
}
