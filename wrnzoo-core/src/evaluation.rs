//! Inference results and embeddings keyed by dataset index.
//!
//! The network is external; it plugs in through [`Classifier`] and [`Embedder`].

use crate::dataset::{IndexedDataset, LabeledDataset, Split};
use crate::error::ZooError;
use crate::identity::ModelIdentity;
use crate::persistence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A model that produces one logit vector per input.
pub trait Classifier<I> {
    fn logits(&self, batch: &[&I]) -> Vec<Vec<f32>>;
}

/// A model that produces one embedding vector per input.
pub trait Embedder<I> {
    fn embed(&self, batch: &[&I]) -> Vec<Vec<f32>>;
}

/// Outcome for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub index: usize,
    pub output: Vec<f32>,
    pub prediction: usize,
    pub target: i64,
    pub correct: bool,
}

/// All records for one model on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: Split,
    pub results: Vec<EvalRecord>,
    pub accuracy: f64,
}

impl EvaluationReport {
    pub fn correct(&self) -> usize {
        self.results.iter().filter(|r| r.correct).count()
    }

    /// Write `index,output,prediction,target,correct` rows; `output` is space-joined.
    pub fn write_csv(&self, path: &Path) -> Result<(), ZooError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["index", "output", "prediction", "target", "correct"])?;
        for record in &self.results {
            let output = record
                .output
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writer.write_record([
                record.index.to_string(),
                output,
                record.prediction.to_string(),
                record.target.to_string(),
                record.correct.to_string(),
            ])?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), rows = self.results.len(), "Wrote evaluation results");
        Ok(())
    }
}

/// Index of the largest logit; the first wins on ties.
///
/// NaN logits are skipped. `None` when the slice is empty or all NaN.
pub fn argmax(logits: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, value) in logits.iter().copied().enumerate() {
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((idx, value)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Run `model` over every sample of `dataset` in batches.
pub fn evaluate<D, M>(
    dataset: &IndexedDataset<D>,
    model: &M,
    batch_size: usize,
) -> Result<EvaluationReport, ZooError>
where
    D: LabeledDataset,
    M: Classifier<D::Item>,
{
    let mut results = Vec::with_capacity(dataset.len());
    for batch in dataset.batches(batch_size) {
        let inputs: Vec<&D::Item> = batch.iter().map(|s| s.data).collect();
        let outputs = model.logits(&inputs);
        if outputs.len() != batch.len() {
            return Err(ZooError::invalid_input(format!(
                "model returned {} outputs for a batch of {}",
                outputs.len(),
                batch.len()
            )));
        }
        for (sample, output) in batch.iter().zip(outputs) {
            let prediction = argmax(&output).ok_or_else(|| {
                ZooError::invalid_input(format!("no usable logits for sample {}", sample.index))
            })?;
            results.push(EvalRecord {
                index: sample.index,
                correct: prediction as i64 == sample.target,
                prediction,
                target: sample.target,
                output,
            });
        }
    }

    let correct = results.iter().filter(|r| r.correct).count();
    let accuracy = if results.is_empty() {
        0.0
    } else {
        correct as f64 / results.len() as f64
    };
    tracing::debug!(split = %dataset.split(), samples = results.len(), accuracy, "Evaluated split");
    Ok(EvaluationReport {
        split: dataset.split(),
        results,
        accuracy,
    })
}

/// Embeddings for one model on one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSet {
    pub model: String,
    pub split: Split,
    pub embeddings: BTreeMap<usize, Vec<f32>>,
}

impl EmbeddingSet {
    pub fn save(&self, path: &Path) -> Result<(), ZooError> {
        persistence::write_json_atomic(path, self)?;
        tracing::info!(path = %path.display(), samples = self.embeddings.len(), "Saved embeddings");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ZooError> {
        persistence::read_json(path)?
            .ok_or_else(|| ZooError::not_found(format!("embeddings file {}", path.display())))
    }
}

/// Collect embeddings for every sample, keyed by dataset index.
pub fn extract_embeddings<D, M>(
    dataset: &IndexedDataset<D>,
    model: &M,
    identity: &ModelIdentity,
    batch_size: usize,
) -> Result<EmbeddingSet, ZooError>
where
    D: LabeledDataset,
    M: Embedder<D::Item>,
{
    let mut embeddings = BTreeMap::new();
    for batch in dataset.batches(batch_size) {
        let inputs: Vec<&D::Item> = batch.iter().map(|s| s.data).collect();
        let outputs = model.embed(&inputs);
        if outputs.len() != batch.len() {
            return Err(ZooError::invalid_input(format!(
                "model returned {} embeddings for a batch of {}",
                outputs.len(),
                batch.len()
            )));
        }
        embeddings.extend(batch.iter().map(|s| s.index).zip(outputs));
    }
    Ok(EmbeddingSet {
        model: identity.stem(),
        split: dataset.split(),
        embeddings,
    })
}

/// `<evaluations>/<stem>/<split>_eval.csv`
pub fn evaluation_csv_path(evaluations_dir: &Path, identity: &ModelIdentity, split: Split) -> PathBuf {
    evaluations_dir
        .join(identity.stem())
        .join(format!("{split}_eval.csv"))
}

/// `<evaluations>/embeddings/<split>_embeds__<stem>.json`
pub fn embeddings_path(evaluations_dir: &Path, identity: &ModelIdentity, split: Split) -> PathBuf {
    evaluations_dir
        .join("embeddings")
        .join(format!("{split}_embeds__{}.json", identity.stem()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::InMemoryDataset;
    use crate::hierarchy::Granularity;
    use crate::identity::Superclass;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Puts all mass on the label stored in the input.
    struct OneHot {
        labels: usize,
    }

    impl Classifier<usize> for OneHot {
        fn logits(&self, batch: &[&usize]) -> Vec<Vec<f32>> {
            batch
                .iter()
                .map(|guess| {
                    let mut out = vec![0.0; self.labels];
                    out[**guess] = 1.0;
                    out
                })
                .collect()
        }
    }

    impl Embedder<usize> for OneHot {
        fn embed(&self, batch: &[&usize]) -> Vec<Vec<f32>> {
            batch.iter().map(|v| vec![**v as f32, 1.0]).collect()
        }
    }

    struct Broken;

    impl Classifier<usize> for Broken {
        fn logits(&self, _batch: &[&usize]) -> Vec<Vec<f32>> {
            Vec::new()
        }
    }

    fn identity() -> ModelIdentity {
        ModelIdentity {
            granularity: Granularity::Coarse,
            superclass: Superclass::All,
            crop_size: 32,
            kernel_size: 8,
            width_factor: 4,
            depth: 16,
        }
    }

    fn dataset() -> IndexedDataset<InMemoryDataset<usize>> {
        // Model guesses are the data; targets disagree on sample 2.
        let ds = InMemoryDataset::new(vec![3, 1, 4, 1, 5], vec![3, 1, 0, 1, 5]).unwrap();
        IndexedDataset::new(ds, Split::Validation)
    }

    #[test]
    fn test_argmax_first_max_wins() {
        assert_eq!(argmax(&[0.1, 0.9, 0.9]), Some(1));
        assert_eq!(argmax(&[-2.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[0.2, f32::NAN, 0.1]), Some(0));
        assert_eq!(argmax(&[f32::NAN, -1.0, 3.0]), Some(2));
        assert_eq!(argmax(&[f32::NAN, f32::NAN]), None);
    }

    #[test]
    fn test_evaluate_accuracy_and_indices() {
        let report = evaluate(&dataset(), &OneHot { labels: 20 }, 2).unwrap();
        assert_eq!(report.split, Split::Validation);
        assert_eq!(report.results.len(), 5);
        assert_eq!(report.correct(), 4);
        assert!((report.accuracy - 0.8).abs() < 1e-12);
        let wrong = &report.results[2];
        assert_eq!(wrong.index, 2);
        assert_eq!(wrong.prediction, 4);
        assert!(!wrong.correct);
    }

    #[test]
    fn test_evaluate_rejects_short_output() {
        let err = evaluate(&dataset(), &Broken, 4).unwrap_err();
        assert!(matches!(err, ZooError::InvalidInput(_)));
    }

    #[test]
    fn test_write_csv() {
        let dir = TempDir::new().unwrap();
        let report = evaluate(&dataset(), &OneHot { labels: 6 }, 8).unwrap();
        let path = evaluation_csv_path(dir.path(), &identity(), Split::Validation);
        report.write_csv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("index,output,prediction,target,correct"));
        assert_eq!(lines.next(), Some("0,0 0 0 1 0 0,3,3,true"));
        assert_eq!(content.lines().count(), 6);
    }

    #[test]
    fn test_extract_and_save_embeddings() {
        let dir = TempDir::new().unwrap();
        let set = extract_embeddings(&dataset(), &OneHot { labels: 6 }, &identity(), 3).unwrap();
        assert_eq!(set.embeddings.len(), 5);
        assert_eq!(set.embeddings[&4], vec![5.0, 1.0]);
        assert_eq!(set.model, "coarse_all_crop32_kernel8_width4_depth16");

        let path = embeddings_path(dir.path(), &identity(), Split::Validation);
        assert!(path.ends_with("embeddings/validation_embeds__coarse_all_crop32_kernel8_width4_depth16.json"));
        set.save(&path).unwrap();
        assert_eq!(EmbeddingSet::load(&path).unwrap(), set);
    }

    #[test]
    fn test_load_missing_embeddings() {
        let dir = TempDir::new().unwrap();
        let err = EmbeddingSet::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ZooError::NotFound(_)));
    }
}
