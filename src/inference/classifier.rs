//! Classifier service
//!
//! [`Classifier`] is the explicitly constructed, read-only service object that
//! request handlers share. It owns the loaded model, the device it runs on and
//! the label order. Forward passes are serialised through a mutex so only one
//! request at a time touches the device; everything else about a request
//! (decoding, resizing, softmax post-processing) runs without the lock.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use burn::tensor::{activation::softmax, backend::Backend, Tensor};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::preprocess::{decode_image, preprocess, PreprocessedImage, IMAGE_SIZE};
use crate::backend::{ComputeTarget, CpuBackend};
use crate::labels::LabelSet;
use crate::model::{load_bundle, ModelManifest, SupConMobileNet};
use crate::utils::error::{ClassifierError, Result};

/// One entry of the probability table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f32,
}

/// Result of classifying one image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Predicted label
    pub label: String,

    /// Index of the predicted label in the label set
    pub index: usize,

    /// Probability of the predicted label
    pub confidence: f32,

    /// Every class, in label-set order
    pub probabilities: Vec<ClassProbability>,

    /// Wall time of the forward pass, lock wait excluded
    pub inference_time_ms: f64,
}

impl Classification {
    /// Build from a probability vector aligned with `labels`
    pub fn from_probabilities(
        probabilities: Vec<f32>,
        labels: &LabelSet,
        inference_time_ms: f64,
    ) -> Result<Self> {
        if probabilities.len() != labels.len() {
            return Err(ClassifierError::Inference(format!(
                "model produced {} probabilities for {} labels",
                probabilities.len(),
                labels.len()
            )));
        }

        let index = argmax_first(&probabilities).ok_or_else(|| {
            ClassifierError::Inference("probability vector has no finite entries".to_string())
        })?;

        let table = labels
            .iter()
            .zip(&probabilities)
            .map(|(label, &probability)| ClassProbability {
                label: label.to_string(),
                probability,
            })
            .collect();

        Ok(Self {
            label: table_label(labels, index),
            index,
            confidence: probabilities[index],
            probabilities: table,
            inference_time_ms,
        })
    }

    /// Whether the top probability reaches `threshold`
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// The `k` most likely classes, highest first; ties keep label order
    pub fn top_k(&self, k: usize) -> Vec<ClassProbability> {
        let mut sorted = self.probabilities.clone();
        sorted.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        sorted.truncate(k);
        sorted
    }

    /// Confidence as a percentage rounded to two decimals
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence as f64 * 10_000.0).round() / 100.0
    }
}

fn table_label(labels: &LabelSet, index: usize) -> String {
    labels.get(index).unwrap_or_default().to_string()
}

/// Index of the largest value; the first one wins on ties.
///
/// NaNs are skipped rather than winning the way `numpy.argmax` lets them;
/// softmax output only holds NaN when the logits already overflowed.
pub fn argmax_first(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Backend-independent view of a classifier, so callers can hold
/// `Arc<dyn ImageClassifier>` whatever device was negotiated
pub trait ImageClassifier: Send + Sync {
    /// Decode, preprocess and classify raw image bytes
    fn classify(&self, bytes: &[u8]) -> Result<Classification>;

    /// Classify an already-decoded image
    fn classify_image(&self, image: &DynamicImage) -> Result<Classification>;

    /// Label order of the loaded model
    fn labels(&self) -> &LabelSet;

    /// Device the forward passes run on
    fn target(&self) -> ComputeTarget;
}

/// Loaded model plus everything needed to turn its output into labels
pub struct Classifier<B: Backend> {
    model: Mutex<SupConMobileNet<B>>,
    device: B::Device,
    labels: LabelSet,
    target: ComputeTarget,
}

impl<B: Backend> Classifier<B> {
    /// Wrap an in-memory model; the label count must match the head
    pub fn new(
        model: SupConMobileNet<B>,
        labels: LabelSet,
        device: B::Device,
        target: ComputeTarget,
    ) -> Result<Self> {
        if model.num_classes() != labels.len() {
            return Err(ClassifierError::Config(format!(
                "classifier head has {} outputs but {} labels were supplied",
                model.num_classes(),
                labels.len()
            )));
        }

        Ok(Self {
            model: Mutex::new(model),
            device,
            labels,
            target,
        })
    }

    /// Load a weight bundle from disk
    pub fn load(path: &Path, device: B::Device, target: ComputeTarget) -> Result<Self> {
        let (model, manifest) = load_bundle::<B>(path, &device)?;
        let ModelManifest { labels, .. } = manifest;
        Self::new(model, labels, device, target)
    }

    /// Side length every input is resized to
    pub fn image_size(&self) -> usize {
        IMAGE_SIZE
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Raw logits for a `[N, 3, H, W]` tensor
    pub fn logits(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        let model = self.lock_model()?;
        tensor_to_vec(model.logits(input))
    }

    /// L2-normalised projection-head output for a `[N, 3, H, W]` tensor
    pub fn embedding(&self, input: Tensor<B, 4>) -> Result<Vec<f32>> {
        let model = self.lock_model()?;
        let output = model.forward(input, true);
        let embedding = output
            .embedding
            .ok_or_else(|| ClassifierError::Inference("embedding was not produced".to_string()))?;
        tensor_to_vec(embedding)
    }

    /// Classify a preprocessed image
    pub fn classify_preprocessed(&self, input: &PreprocessedImage) -> Result<Classification> {
        let tensor = input.to_tensor::<B>(&self.device);

        let model = self.lock_model()?;
        let start = Instant::now();
        let probabilities = softmax(model.logits(tensor), 1);
        let probabilities = tensor_to_vec(probabilities)?;
        let elapsed = start.elapsed();
        drop(model);

        let result = Classification::from_probabilities(
            probabilities,
            &self.labels,
            elapsed.as_secs_f64() * 1000.0,
        )?;

        debug!(
            "Classified as {} ({:.2}%) in {:.1} ms on {}",
            result.label,
            result.confidence * 100.0,
            result.inference_time_ms,
            self.target
        );

        Ok(result)
    }

    /// The model is only read through the lock; a guard poisoned by a
    /// panicking forward pass is recovered.
    fn lock_model(&self) -> Result<MutexGuard<'_, SupConMobileNet<B>>> {
        Ok(self.model.lock().unwrap_or_else(|poisoned| {
            warn!("Model lock poisoned by an earlier panic; recovering");
            poisoned.into_inner()
        }))
    }
}

impl<B: Backend> ImageClassifier for Classifier<B> {
    fn classify(&self, bytes: &[u8]) -> Result<Classification> {
        let image = decode_image(bytes)?;
        self.classify_image(&image)
    }

    fn classify_image(&self, image: &DynamicImage) -> Result<Classification> {
        let input = preprocess(image, IMAGE_SIZE);
        self.classify_preprocessed(&input)
    }

    fn labels(&self) -> &LabelSet {
        &self.labels
    }

    fn target(&self) -> ComputeTarget {
        self.target
    }
}

fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| ClassifierError::Inference(format!("failed to read tensor: {:?}", e)))
}

/// Load a bundle onto the negotiated device, erasing the backend type
pub fn load_classifier(path: &Path, target: ComputeTarget) -> Result<Arc<dyn ImageClassifier>> {
    match target {
        ComputeTarget::Cpu => {
            let device = burn_ndarray::NdArrayDevice::Cpu;
            let classifier = Classifier::<CpuBackend>::load(path, device, target)?;
            Ok(Arc::new(classifier))
        }
        #[cfg(feature = "cuda")]
        ComputeTarget::Cuda(index) => {
            let device = burn_cuda::CudaDevice::new(index);
            let classifier = Classifier::<crate::backend::GpuBackend>::load(path, device, target)?;
            Ok(Arc::new(classifier))
        }
        #[cfg(not(feature = "cuda"))]
        ComputeTarget::Cuda(_) => Err(ClassifierError::Device(
            "CUDA target requested but the `cuda` feature is not compiled in".to_string(),
        )),
    }
}
