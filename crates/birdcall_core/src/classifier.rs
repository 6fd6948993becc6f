//! Species classifier: preprocessing, inference and post-processing.

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::labels::ClassLabelSet;
use crate::model::ImageModel;
use crate::preprocess::Preprocessor;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of one `predict` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    /// Percentage in [0, 100].
    pub confidence: f32,
    /// Output index the label came from.
    pub index: usize,
}

enum ModelState {
    Unloaded,
    Loaded(Box<dyn ImageModel>),
}

/// Turns an image file into a species label using a fixed pretrained model.
///
/// Starts unloaded; [`Classifier::load`] moves it to loaded exactly once.
pub struct Classifier {
    labels: ClassLabelSet,
    preprocessor: Preprocessor,
    apply_softmax: bool,
    state: ModelState,
}

impl Classifier {
    pub fn new(labels: ClassLabelSet, cfg: &ClassifierConfig) -> Self {
        Self {
            labels,
            preprocessor: Preprocessor::new(cfg),
            apply_softmax: cfg.apply_softmax,
            state: ModelState::Unloaded,
        }
    }

    /// Build an unloaded classifier from config, reading the labels file if one is set.
    pub fn from_config(cfg: &ClassifierConfig) -> Result<Self> {
        let labels = match &cfg.labels_path {
            Some(path) => ClassLabelSet::from_file(path)?,
            None => ClassLabelSet::builtin(),
        };
        Ok(Self::new(labels, cfg))
    }

    /// Load the ONNX artifact named in `cfg`.
    #[cfg(feature = "onnx")]
    pub fn load(&mut self, cfg: &ClassifierConfig) -> Result<()> {
        if self.is_loaded() {
            return Err(Error::ModelLoad("model already loaded".to_string()));
        }
        let model = crate::model::OrtModel::from_file(&cfg.model_path)?;
        self.attach(Box::new(model))?;
        info!("Model loaded from {}", cfg.model_path.display());
        Ok(())
    }

    #[cfg(not(feature = "onnx"))]
    pub fn load(&mut self, _cfg: &ClassifierConfig) -> Result<()> {
        Err(Error::ModelLoad(
            "built without ONNX Runtime support (enable the `onnx` feature)".to_string(),
        ))
    }

    /// Install an already constructed model, checking it against the label table.
    pub fn attach(&mut self, model: Box<dyn ImageModel>) -> Result<()> {
        if self.is_loaded() {
            return Err(Error::ModelLoad("model already loaded".to_string()));
        }
        match model.output_len() {
            Some(width) if width != self.labels.len() => {
                let err = Error::LabelCount {
                    expected: width,
                    got: self.labels.len(),
                };
                return Err(Error::ModelLoad(err.to_string()));
            }
            Some(_) => {}
            None => warn!("Model output width is dynamic; label count checked per prediction"),
        }
        self.state = ModelState::Loaded(model);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ModelState::Loaded(_))
    }

    pub fn labels(&self) -> &ClassLabelSet {
        &self.labels
    }

    pub fn predict(&self, image_path: &Path) -> Result<PredictionResult> {
        let probs = self.probabilities(image_path)?;
        let (index, best) = argmax(&probs)
            .ok_or_else(|| Error::Inference("model returned an empty output".to_string()))?;
        let label = self
            .labels
            .get(index)
            .ok_or_else(|| Error::Inference(format!("no label for class {index}")))?
            .to_string();
        let result = PredictionResult {
            label,
            confidence: (best * 100.0).clamp(0.0, 100.0),
            index,
        };
        debug!(
            "Predicted {} ({:.1}%) for {}",
            result.label,
            result.confidence,
            image_path.display()
        );
        Ok(result)
    }

    /// Confidence in percent for every class, in label order.
    pub fn predict_distribution(&self, image_path: &Path) -> Result<Vec<f32>> {
        Ok(self
            .probabilities(image_path)?
            .into_iter()
            .map(|p| p * 100.0)
            .collect())
    }

    fn probabilities(&self, image_path: &Path) -> Result<Vec<f32>> {
        let ModelState::Loaded(model) = &self.state else {
            return Err(Error::Inference("model not loaded".to_string()));
        };
        let tensor = self.preprocessor.prepare(image_path)?;
        let scores = model.run(tensor)?;
        if scores.len() != self.labels.len() {
            return Err(Error::Inference(format!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::Inference("model returned non-finite scores".to_string()));
        }
        Ok(if self.apply_softmax {
            softmax(&scores)
        } else {
            scores
        })
    }
}

/// Index and value of the largest score; ties resolve to the lowest index.
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if v <= bv => best,
            _ => Some((i, v)),
        })
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;
    use std::path::PathBuf;

    struct FixedModel {
        scores: Vec<f32>,
        declared: Option<usize>,
    }

    impl ImageModel for FixedModel {
        fn output_len(&self) -> Option<usize> {
            self.declared
        }

        fn run(&self, _input: Array4<f32>) -> Result<Vec<f32>> {
            Ok(self.scores.clone())
        }
    }

    fn image_fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bird.png");
        image::RgbImage::from_pixel(10, 10, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();
        (dir, path)
    }

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.25; 4]), Some((0, 0.25)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(probs.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn unloaded_classifier_reports_inference_error() {
        let (_dir, path) = image_fixture();
        let classifier = Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        assert!(!classifier.is_loaded());
        assert!(matches!(classifier.predict(&path), Err(Error::Inference(_))));
    }

    #[test]
    fn mismatched_output_width_is_rejected_at_load() {
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        let err = classifier
            .attach(Box::new(FixedModel {
                scores: vec![0.0; 19],
                declared: Some(19),
            }))
            .unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
        assert!(err.to_string().contains("label count mismatch"));
        assert!(!classifier.is_loaded());
    }

    #[test]
    fn second_attach_is_rejected() {
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        let model = || {
            Box::new(FixedModel {
                scores: vec![0.05; 20],
                declared: Some(20),
            })
        };
        classifier.attach(model()).unwrap();
        assert!(matches!(classifier.attach(model()), Err(Error::ModelLoad(_))));
    }

    #[test]
    fn dynamic_width_mismatch_surfaces_per_prediction() {
        let (_dir, path) = image_fixture();
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        classifier
            .attach(Box::new(FixedModel {
                scores: vec![0.5, 0.5],
                declared: None,
            }))
            .unwrap();
        assert!(matches!(classifier.predict(&path), Err(Error::Inference(_))));
    }

    #[test]
    fn predict_scales_best_probability_to_percent() {
        let (_dir, path) = image_fixture();
        let mut scores = vec![0.01; 20];
        scores[17] = 0.81;
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        classifier
            .attach(Box::new(FixedModel {
                scores,
                declared: Some(20),
            }))
            .unwrap();
        let result = classifier.predict(&path).unwrap();
        assert_eq!(result.label, "AMERICAN FLAMINGO");
        assert_eq!(result.index, 17);
        assert_relative_eq!(result.confidence, 81.0, epsilon = 1e-3);
    }

    #[test]
    fn softmax_option_turns_logits_into_distribution() {
        let (_dir, path) = image_fixture();
        let cfg = ClassifierConfig {
            apply_softmax: true,
            ..ClassifierConfig::default()
        };
        let mut logits = vec![0.0; 20];
        logits[4] = 5.0;
        let mut classifier = Classifier::new(ClassLabelSet::builtin(), &cfg);
        classifier
            .attach(Box::new(FixedModel {
                scores: logits,
                declared: Some(20),
            }))
            .unwrap();
        let dist = classifier.predict_distribution(&path).unwrap();
        assert_relative_eq!(dist.iter().sum::<f32>(), 100.0, epsilon = 1e-3);
        assert_eq!(classifier.predict(&path).unwrap().label, "AFRICAN EMERALD CUCKOO");
    }

    #[test]
    fn non_finite_scores_are_an_inference_error() {
        let (_dir, path) = image_fixture();
        let mut scores = vec![0.0; 20];
        scores[0] = f32::NAN;
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        classifier
            .attach(Box::new(FixedModel {
                scores,
                declared: Some(20),
            }))
            .unwrap();
        assert!(matches!(classifier.predict(&path), Err(Error::Inference(_))));
    }

    #[test]
    fn bad_image_is_a_decode_error_not_inference() {
        let mut classifier =
            Classifier::new(ClassLabelSet::builtin(), &ClassifierConfig::default());
        classifier
            .attach(Box::new(FixedModel {
                scores: vec![0.05; 20],
                declared: Some(20),
            }))
            .unwrap();
        let err = classifier
            .predict(Path::new("/nonexistent/bird.png"))
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn missing_artifact_is_a_model_load_error() {
        let cfg = ClassifierConfig {
            model_path: PathBuf::from("/nonexistent/model.onnx"),
            ..ClassifierConfig::default()
        };
        let mut classifier = Classifier::from_config(&cfg).unwrap();
        assert!(matches!(classifier.load(&cfg), Err(Error::ModelLoad(_))));
        assert!(!classifier.is_loaded());
    }
}
