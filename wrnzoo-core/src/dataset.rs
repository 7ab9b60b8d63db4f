//! Labeled datasets with stable per-sample identity.
//!
//! Batched iteration loses track of which sample produced which output, so
//! every retrieval through [`IndexedDataset`] carries the sample's position
//! and the split it came from. Result records key on that index.

use crate::hierarchy::{Granularity, HierarchyError, coarse_index_of};
use crate::identity::{ModelIdentity, Superclass};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Which partition of the data a dataset represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Test,
    Validation,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "test" => Ok(Self::Test),
            "validation" => Ok(Self::Validation),
            other => Err(format!("unknown split '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("no stored dataset file for the {0} split (expected train or test)")]
    InvalidSplit(Split),

    #[error("class {class} has {available} samples, {requested} requested")]
    InsufficientSamples {
        class: i64,
        available: usize,
        requested: usize,
    },

    #[error("dataset has {data} items but {targets} targets")]
    LengthMismatch { data: usize, targets: usize },

    #[error("index {index} is out of bounds for a dataset of {len} items")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("operation requires {expected} labels, dataset is {actual}")]
    WrongGranularity {
        expected: Granularity,
        actual: Granularity,
    },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

/// A dataset of items with integer class targets.
pub trait LabeledDataset {
    type Item;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Item and target at `index`.
    fn get(&self, index: usize) -> Option<(&Self::Item, i64)>;
}

/// A dataset held fully in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryDataset<T> {
    data: Vec<T>,
    targets: Vec<i64>,
    granularity: Granularity,
}

impl<T> InMemoryDataset<T> {
    /// A fine-labelled dataset.
    pub fn new(data: Vec<T>, targets: Vec<i64>) -> Result<Self, DatasetError> {
        if data.len() != targets.len() {
            return Err(DatasetError::LengthMismatch {
                data: data.len(),
                targets: targets.len(),
            });
        }
        Ok(Self {
            data,
            targets,
            granularity: Granularity::Fine,
        })
    }

    pub fn targets(&self) -> &[i64] {
        &self.targets
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Relabel every target with its coarse superclass.
    ///
    /// Not reversible; a coarse dataset is returned unchanged.
    pub fn to_coarse(self) -> Result<Self, HierarchyError> {
        if self.granularity == Granularity::Coarse {
            return Ok(self);
        }
        let targets = self
            .targets
            .iter()
            .map(|t| coarse_index_of(*t).map(|c| c as i64))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            data: self.data,
            targets,
            granularity: Granularity::Coarse,
        })
    }
}

impl<T: Clone> InMemoryDataset<T> {
    /// Keep the rows at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, DatasetError> {
        let len = self.data.len();
        let mut data = Vec::with_capacity(indices.len());
        let mut targets = Vec::with_capacity(indices.len());
        for &index in indices {
            let item = self
                .data
                .get(index)
                .ok_or(DatasetError::IndexOutOfBounds { index, len })?;
            data.push(item.clone());
            targets.push(self.targets[index]);
        }
        Ok(Self {
            data,
            targets,
            granularity: self.granularity,
        })
    }

    /// Keep only fine samples belonging to `superclass`.
    pub fn restrict_to(&self, superclass: Superclass) -> Result<Self, DatasetError> {
        let Some(coarse) = superclass.index() else {
            return Ok(self.clone());
        };
        if self.granularity != Granularity::Fine {
            return Err(DatasetError::WrongGranularity {
                expected: Granularity::Fine,
                actual: self.granularity,
            });
        }
        let mut keep = Vec::new();
        for (index, target) in self.targets.iter().enumerate() {
            if coarse_index_of(*target)? == coarse {
                keep.push(index);
            }
        }
        self.subset(&keep)
    }
}

impl<T> LabeledDataset for InMemoryDataset<T> {
    type Item = T;

    fn len(&self) -> usize {
        self.data.len()
    }

    fn get(&self, index: usize) -> Option<(&T, i64)> {
        Some((self.data.get(index)?, *self.targets.get(index)?))
    }
}

/// One retrieval from an [`IndexedDataset`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedSample<'a, T> {
    pub data: &'a T,
    pub target: i64,
    pub index: usize,
}

/// Wraps a dataset so every sample carries its position and split.
#[derive(Debug, Clone)]
pub struct IndexedDataset<D> {
    inner: D,
    split: Split,
}

impl<D: LabeledDataset> IndexedDataset<D> {
    pub fn new(inner: D, split: Split) -> Self {
        Self { inner, split }
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<IndexedSample<'_, D::Item>> {
        let (data, target) = self.inner.get(index)?;
        Some(IndexedSample {
            data,
            target,
            index,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = IndexedSample<'_, D::Item>> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Consecutive batches of at most `batch_size` samples.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> impl Iterator<Item = Vec<IndexedSample<'_, D::Item>>> + '_ {
        let batch_size = batch_size.max(1);
        (0..self.len())
            .step_by(batch_size)
            .map(move |start| {
                (start..(start + batch_size).min(self.len()))
                    .filter_map(|index| self.get(index))
                    .collect()
            })
    }
}

/// Data pipeline options, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformConfig {
    crop_size: u32,
    horizontal_flip: bool,
}

impl TransformConfig {
    pub fn new(crop_size: u32, horizontal_flip: bool) -> Self {
        Self {
            crop_size,
            horizontal_flip,
        }
    }

    /// Pipeline options for feeding `identity` with `split` data.
    /// Only training data is flipped.
    pub fn for_identity(identity: &ModelIdentity, split: Split) -> Self {
        Self::new(identity.crop_size, split == Split::Train)
    }

    pub fn crop_size(&self) -> u32 {
        self.crop_size
    }

    pub fn horizontal_flip(&self) -> bool {
        self.horizontal_flip
    }
}

/// Stratified sample of `per_class` indices from every class in `targets`.
///
/// Deterministic for a given seed. Returned indices are ascending.
pub fn sample_validation_indices(
    targets: &[i64],
    per_class: usize,
    seed: u64,
) -> Result<Vec<usize>, DatasetError> {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (index, target) in targets.iter().enumerate() {
        by_class.entry(*target).or_default().push(index);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut sampled = Vec::with_capacity(by_class.len() * per_class);
    for (class, members) in &by_class {
        if members.len() < per_class {
            return Err(DatasetError::InsufficientSamples {
                class: *class,
                available: members.len(),
                requested: per_class,
            });
        }
        sampled.extend(
            rand::seq::index::sample(&mut rng, members.len(), per_class)
                .into_iter()
                .map(|i| members[i]),
        );
    }
    sampled.sort_unstable();
    tracing::debug!(
        classes = by_class.len(),
        samples = sampled.len(),
        "Sampled validation indices"
    );
    Ok(sampled)
}

/// Location of a stored train/test dataset:
/// `root/<split>/<granularity>/<superclass>/crop_size<c>/dataset_<split>_<granularity>_<superclass>_crop<c>.pt`.
pub fn dataset_file_path(
    root: &Path,
    split: Split,
    granularity: Granularity,
    superclass: Superclass,
    crop_size: u32,
) -> Result<PathBuf, DatasetError> {
    if split == Split::Validation {
        return Err(DatasetError::InvalidSplit(split));
    }
    let label = superclass.label();
    Ok(root
        .join(split.as_str())
        .join(granularity.as_str())
        .join(label)
        .join(format!("crop_size{crop_size}"))
        .join(format!(
            "dataset_{split}_{granularity}_{label}_crop{crop_size}.pt"
        )))
}

/// Location of the shared validation dataset.
pub fn validation_dataset_path(root: &Path) -> PathBuf {
    root.join(Split::Validation.as_str())
        .join("validation_dataset.pt")
}
