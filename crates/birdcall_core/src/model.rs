//! Inference backends behind a small trait, with ONNX Runtime as the production one.

use crate::error::Result;
use ndarray::Array4;

/// A loaded image model: one preprocessed sample in, one score vector out.
pub trait ImageModel: Send + Sync {
    /// Output width declared by the artifact, when it is fixed.
    fn output_len(&self) -> Option<usize>;

    fn run(&self, input: Array4<f32>) -> Result<Vec<f32>>;
}

#[cfg(feature = "onnx")]
pub use self::onnx::OrtModel;

#[cfg(feature = "onnx")]
mod onnx {
    use super::ImageModel;
    use crate::error::{Error, Result};
    use ndarray::{Array4, CowArray};
    use once_cell::sync::OnceCell;
    use ort::{
        GraphOptimizationLevel, SessionBuilder, environment::Environment, session::Session,
        tensor::OrtOwnedTensor, value::Value,
    };
    use std::path::Path;
    use std::sync::Arc;

    static ORT_ENV: OnceCell<Arc<Environment>> = OnceCell::new();

    fn environment() -> Result<Arc<Environment>> {
        ORT_ENV
            .get_or_try_init(|| {
                Environment::builder()
                    .with_name("birdcall")
                    .build()
                    .map(Environment::into_arc)
            })
            .cloned()
            .map_err(|e| Error::ModelLoad(format!("cannot initialize ONNX Runtime: {e}")))
    }

    /// Image classifier session backed by ONNX Runtime.
    pub struct OrtModel {
        session: Session,
        output_len: Option<usize>,
    }

    impl OrtModel {
        pub fn from_file(path: &Path) -> Result<Self> {
            if !path.is_file() {
                return Err(Error::ModelLoad(format!(
                    "model file missing: {}",
                    path.display()
                )));
            }
            let env = environment()?;
            let session = SessionBuilder::new(&env)
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level1))
                .and_then(|b| b.with_model_from_file(path))
                .map_err(|e| Error::ModelLoad(format!("{}: {e}", path.display())))?;
            let output_len = session
                .outputs
                .first()
                .and_then(|out| out.dimensions.last().copied().flatten())
                .map(|d| d as usize);
            Ok(Self {
                session,
                output_len,
            })
        }
    }

    impl ImageModel for OrtModel {
        fn output_len(&self) -> Option<usize> {
            self.output_len
        }

        fn run(&self, input: Array4<f32>) -> Result<Vec<f32>> {
            let input_array = input.into_dyn();
            let cow = CowArray::from(input_array.view());
            let value = Value::from_array(self.session.allocator(), &cow)
                .map_err(|e| Error::Inference(format!("cannot build input tensor: {e}")))?;
            let outputs: Vec<Value> = self
                .session
                .run(vec![value])
                .map_err(|e| Error::Inference(e.to_string()))?;
            let first = outputs
                .first()
                .ok_or_else(|| Error::Inference("model produced no output".to_string()))?;
            let scores: OrtOwnedTensor<f32, _> = first
                .try_extract()
                .map_err(|e| Error::Inference(e.to_string()))?;
            Ok(scores.view().iter().copied().collect())
        }
    }
}
