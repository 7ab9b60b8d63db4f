//! # wrnzoo-core
//!
//! Shared logic for training, evaluating and profiling wide residual networks on
//! CIFAR-100 at two label granularities.
//!
//! - [`identity`]: the weight-filename codec that recovers a model's
//!   hyperparameters from its path.
//! - [`hierarchy`]: the fixed fine/coarse label taxonomy.
//! - [`discovery`], [`dataset`], [`evaluation`], [`profile`]: the plumbing the
//!   evaluation, embedding and profiling entry points are built from.

pub mod config;
pub mod dataset;
pub mod discovery;
pub mod error;
pub mod evaluation;
pub mod hierarchy;
pub mod identity;
pub mod persistence;
pub mod profile;

pub use config::{ZooConfig, load_config};
pub use dataset::{IndexedDataset, InMemoryDataset, LabeledDataset, Split, TransformConfig};
pub use discovery::{ModelFilter, find_model_files};
pub use error::ZooError;
pub use hierarchy::{
    Granularity, LabelHierarchy, class_name_for, coarse_index_of, remap_targets,
};
pub use identity::{IdentityError, ModelIdentity, ParseStage, Superclass, parse, parse_path};
pub use profile::{ModelProfile, ParameterSpace, ProfileWriter};
