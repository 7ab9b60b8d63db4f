//! Model profile rows (`model_profiles.csv`) and the profiled parameter space.

use crate::error::ZooError;
use crate::hierarchy::Granularity;
use crate::identity::{ModelIdentity, Superclass};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// CSV header, in column order.
pub const PROFILE_FIELDS: [&str; 10] = [
    "granularity",
    "superclass",
    "crop_size",
    "kernel_size",
    "width_factor",
    "depth",
    "accuracy",
    "macs",
    "flops",
    "params",
];

/// Placeholder written for unknown values.
pub const NOT_AVAILABLE: &str = "N/A";

/// Compute cost of one forward pass, in GMac and millions of parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityEstimate {
    pub gmacs: f64,
    pub mparams: f64,
}

impl ComplexityEstimate {
    /// Parse labels like `"0.42 GMac"` and `"2.75 M"`.
    pub fn from_labels(macs: &str, params: &str) -> Option<Self> {
        Some(Self {
            gmacs: leading_number(macs)?,
            mparams: leading_number(params)?,
        })
    }

    pub fn macs_label(&self) -> String {
        format!("{:.2} GMac", self.gmacs)
    }

    /// One multiply-accumulate counts as two floating point operations.
    pub fn flops_label(&self) -> String {
        format!("{:.2} GFLOPs", 2.0 * self.gmacs)
    }

    pub fn params_label(&self) -> String {
        format!("{:.2} M", self.mparams)
    }
}

fn leading_number(label: &str) -> Option<f64> {
    label.split_whitespace().next()?.parse().ok()
}

/// One row of a profile CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub granularity: Granularity,
    /// `None` for architecture-only profiles.
    pub superclass: Option<Superclass>,
    pub crop_size: u32,
    pub kernel_size: u32,
    pub width_factor: u32,
    pub depth: u32,
    pub accuracy: Option<f64>,
    pub complexity: Option<ComplexityEstimate>,
}

impl ModelProfile {
    /// Profile of a trained model.
    pub fn from_identity(identity: &ModelIdentity) -> Self {
        Self {
            granularity: identity.granularity,
            superclass: Some(identity.superclass),
            crop_size: identity.crop_size,
            kernel_size: identity.kernel_size,
            width_factor: identity.width_factor,
            depth: identity.depth,
            accuracy: None,
            complexity: None,
        }
    }

    /// Profile of an architecture, independent of training data.
    pub fn for_architecture(identity: &ModelIdentity) -> Self {
        Self {
            superclass: None,
            ..Self::from_identity(identity)
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_complexity(mut self, complexity: ComplexityEstimate) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Fields in [`PROFILE_FIELDS`] order.
    pub fn to_record(&self) -> [String; 10] {
        let na = || NOT_AVAILABLE.to_string();
        [
            self.granularity.to_string(),
            self.superclass.map_or_else(na, |s| s.to_string()),
            self.crop_size.to_string(),
            self.kernel_size.to_string(),
            self.width_factor.to_string(),
            self.depth.to_string(),
            self.accuracy.map_or_else(na, |a| a.to_string()),
            self.complexity.map_or_else(na, |c| c.macs_label()),
            self.complexity.map_or_else(na, |c| c.flops_label()),
            self.complexity.map_or_else(na, |c| c.params_label()),
        ]
    }
}

/// Appends profile rows to a CSV file.
pub struct ProfileWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl ProfileWriter {
    /// Truncate `path` and write the header.
    pub fn create(path: &Path) -> Result<Self, ZooError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Self::start(file, path, true)
    }

    /// Append to `path`, writing the header only if the file is new or empty.
    pub fn append(path: &Path) -> Result<Self, ZooError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::start(file, path, needs_header)
    }

    fn start(file: File, path: &Path, header: bool) -> Result<Self, ZooError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if header {
            writer.write_record(PROFILE_FIELDS)?;
        }
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write(&mut self, profile: &ModelProfile) -> Result<(), ZooError> {
        self.writer.write_record(profile.to_record())?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and report how many rows were written.
    pub fn finish(mut self) -> Result<usize, ZooError> {
        self.writer.flush()?;
        tracing::info!(path = %self.path.display(), rows = self.rows, "Wrote model profiles");
        Ok(self.rows)
    }
}

/// Grid of architectures to profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    pub granularities: Vec<Granularity>,
    /// Paired (crop size, kernel size) settings.
    pub crop_kernel: Vec<(u32, u32)>,
    pub widths: Vec<u32>,
    pub depths: Vec<u32>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            granularities: vec![Granularity::Coarse],
            crop_kernel: vec![(32, 8)],
            widths: vec![2, 4, 6, 8, 10],
            depths: vec![8, 12, 16, 20, 22, 24, 28],
        }
    }
}

impl ParameterSpace {
    /// Every grid point, granularity outermost and depth innermost.
    pub fn identities(&self) -> Vec<ModelIdentity> {
        let mut points = Vec::with_capacity(self.len());
        for &granularity in &self.granularities {
            for &(crop_size, kernel_size) in &self.crop_kernel {
                for &width_factor in &self.widths {
                    for &depth in &self.depths {
                        points.push(ModelIdentity {
                            granularity,
                            superclass: Superclass::All,
                            crop_size,
                            kernel_size,
                            width_factor,
                            depth,
                        });
                    }
                }
            }
        }
        points
    }

    pub fn len(&self) -> usize {
        self.granularities.len() * self.crop_kernel.len() * self.widths.len() * self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn identity() -> ModelIdentity {
        ModelIdentity {
            granularity: Granularity::Coarse,
            superclass: Superclass::Index(3),
            crop_size: 32,
            kernel_size: 8,
            width_factor: 4,
            depth: 16,
        }
    }

    #[test]
    fn test_complexity_labels() {
        let c = ComplexityEstimate::from_labels("0.42 GMac", "2.75 M").unwrap();
        assert_eq!(c.macs_label(), "0.42 GMac");
        assert_eq!(c.flops_label(), "0.84 GFLOPs");
        assert_eq!(c.params_label(), "2.75 M");
        assert!(ComplexityEstimate::from_labels("n/a", "2 M").is_none());
    }

    #[test]
    fn test_record_fills_not_available() {
        let record = ModelProfile::for_architecture(&identity()).to_record();
        assert_eq!(
            record,
            ["coarse", "N/A", "32", "8", "4", "16", "N/A", "N/A", "N/A", "N/A"].map(String::from)
        );
        let record = ModelProfile::from_identity(&identity())
            .with_accuracy(0.5)
            .to_record();
        assert_eq!(record[1], "3");
        assert_eq!(record[6], "0.5");
    }

    #[test]
    fn test_create_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evaluations").join("model_profiles.csv");

        let mut writer = ProfileWriter::create(&path).unwrap();
        writer.write(&ModelProfile::from_identity(&identity())).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);

        let mut writer = ProfileWriter::append(&path).unwrap();
        writer.write(&ModelProfile::for_architecture(&identity())).unwrap();
        writer.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], PROFILE_FIELDS.join(","));
        assert!(lines[1].starts_with("coarse,3,32,8,4,16"));
        assert!(lines[2].starts_with("coarse,N/A,"));
    }

    #[test]
    fn test_append_to_new_file_writes_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh.csv");
        ProfileWriter::append(&path).unwrap().finish().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), PROFILE_FIELDS.join(","));
    }

    #[test]
    fn test_parameter_space_order() {
        let space = ParameterSpace::default();
        assert_eq!(space.len(), 35);
        let points = space.identities();
        assert_eq!(points.len(), 35);
        assert_eq!((points[0].width_factor, points[0].depth), (2, 8));
        assert_eq!((points[1].width_factor, points[1].depth), (2, 12));
        assert_eq!((points[7].width_factor, points[7].depth), (4, 8));
        assert!(points.iter().all(|p| p.crop_size == 32 && p.kernel_size == 8));
    }
}
