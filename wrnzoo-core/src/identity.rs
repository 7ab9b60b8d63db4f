//! Model identity codec.
//!
//! Weight files are self-describing: the hyperparameters needed to rebuild a
//! model skeleton are serialized into the filename as underscore-joined tokens,
//!
//! ```text
//! model_<granularity>_<superclass>_crop<c>_kernel<k>_width<w>_depth<d>.pt
//! ```
//!
//! where `<superclass>` is `class<idx>`, a literal coarse class name such as
//! `large_carnivores`, the placeholder `all`, or absent for coarse models trained
//! on every superclass. Tokens may appear in any order. [`ModelIdentity::file_name`]
//! and [`parse`] share the token grammar defined here and are exact inverses.

use crate::error::ZooError;
use crate::hierarchy::{COARSE_CLASSES, Granularity, NUM_COARSE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Literal prefix carried by every weight file.
pub const MODEL_PREFIX: &str = "model_";

/// Weight-file extensions recognized by the codec and by discovery.
pub const WEIGHT_EXTENSIONS: [&str; 2] = ["pt", "pth"];

/// Placeholder token for models trained across all superclasses.
pub const ALL_SUPERCLASSES_TOKEN: &str = "all";

/// A named token in a model filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Class,
    Crop,
    Kernel,
    Width,
    Depth,
}

impl Parameter {
    pub const ALL: [Parameter; 5] = [
        Parameter::Class,
        Parameter::Crop,
        Parameter::Kernel,
        Parameter::Width,
        Parameter::Depth,
    ];

    /// Token prefix used in filenames.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Crop => "crop",
            Self::Kernel => "kernel",
            Self::Width => "width",
            Self::Depth => "depth",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Parameter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.prefix() == s)
            .ok_or_else(|| format!("unsupported parameter name '{s}'"))
    }
}

/// Which superclass a model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Superclass {
    /// Trained across every superclass.
    All,
    /// A single coarse class, by coarse index.
    Index(u8),
}

impl Superclass {
    /// Superclass for a coarse index, if in range.
    pub fn from_index(idx: usize) -> Option<Self> {
        (idx < NUM_COARSE).then(|| Self::Index(idx as u8))
    }

    pub fn index(self) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Index(idx) => Some(idx as usize),
        }
    }

    /// Coarse class name, `None` for [`Superclass::All`].
    pub fn name(self) -> Option<&'static str> {
        self.index().and_then(|idx| COARSE_CLASSES.get(idx).copied())
    }

    /// Canonical filename token: `class<idx>` or `all`.
    pub fn token(self) -> String {
        match self {
            Self::All => ALL_SUPERCLASSES_TOKEN.to_string(),
            Self::Index(idx) => format!("{}{idx}", Parameter::Class.prefix()),
        }
    }

    /// Directory/label form used by dataset paths: the class name or `all`.
    pub fn label(self) -> &'static str {
        self.name().unwrap_or(ALL_SUPERCLASSES_TOKEN)
    }
}

impl fmt::Display for Superclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL_SUPERCLASSES_TOKEN),
            Self::Index(idx) => write!(f, "{idx}"),
        }
    }
}

impl FromStr for Superclass {
    type Err = String;

    /// Accepts `all`, a coarse index, `class<idx>`, or a coarse class name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL_SUPERCLASSES_TOKEN {
            return Ok(Self::All);
        }
        let digits = s.strip_prefix(Parameter::Class.prefix()).unwrap_or(s);
        if let Ok(idx) = digits.parse::<usize>() {
            return Self::from_index(idx)
                .ok_or_else(|| format!("superclass index {idx} is out of range [0, {NUM_COARSE})"));
        }
        COARSE_CLASSES
            .iter()
            .position(|name| *name == s)
            .and_then(Self::from_index)
            .ok_or_else(|| format!("unknown superclass '{s}'"))
    }
}

impl Serialize for Superclass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL_SUPERCLASSES_TOKEN),
            Self::Index(idx) => serializer.serialize_u8(*idx),
        }
    }
}

impl<'de> Deserialize<'de> for Superclass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Index(idx) => Self::from_index(idx as usize)
                .ok_or_else(|| serde::de::Error::custom(format!("superclass index {idx} out of range"))),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// The decoded hyperparameters of one trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelIdentity {
    pub granularity: Granularity,
    pub superclass: Superclass,
    pub crop_size: u32,
    pub kernel_size: u32,
    pub width_factor: u32,
    pub depth: u32,
}

impl ModelIdentity {
    /// Build an identity, rejecting hyperparameters the decoder would refuse.
    pub fn new(
        granularity: Granularity,
        superclass: Superclass,
        crop_size: u32,
        kernel_size: u32,
        width_factor: u32,
        depth: u32,
    ) -> Result<Self, ZooError> {
        let identity = Self {
            granularity,
            superclass,
            crop_size,
            kernel_size,
            width_factor,
            depth,
        };
        identity.validate()?;
        Ok(identity)
    }

    /// Every numeric parameter must be positive for the name to decode.
    pub fn validate(&self) -> Result<(), ZooError> {
        let values = [
            (Parameter::Crop, self.crop_size),
            (Parameter::Kernel, self.kernel_size),
            (Parameter::Width, self.width_factor),
            (Parameter::Depth, self.depth),
        ];
        match values.into_iter().find(|(_, value)| *value == 0) {
            Some((parameter, _)) => Err(ZooError::invalid_input(format!(
                "'{parameter}' must be a positive integer"
            ))),
            None => Ok(()),
        }
    }

    /// Filename without the `model_` prefix and extension.
    pub fn stem(&self) -> String {
        self.stem_with(self.superclass.token())
    }

    /// Canonical weight filename.
    pub fn file_name(&self) -> String {
        format!("{MODEL_PREFIX}{}.{}", self.stem(), WEIGHT_EXTENSIONS[0])
    }

    /// Weight filename carrying the literal superclass name, as written at training time.
    pub fn file_name_with_superclass_name(&self) -> String {
        let stem = self.stem_with(self.superclass.label().to_string());
        format!("{MODEL_PREFIX}{stem}.{}", WEIGHT_EXTENSIONS[0])
    }

    fn stem_with(&self, superclass_token: String) -> String {
        format!(
            "{}_{}_{}{}_{}{}_{}{}_{}{}",
            self.granularity,
            superclass_token,
            Parameter::Crop.prefix(),
            self.crop_size,
            Parameter::Kernel.prefix(),
            self.kernel_size,
            Parameter::Width.prefix(),
            self.width_factor,
            Parameter::Depth.prefix(),
            self.depth,
        )
    }

    /// Width of the label space the model was trained on.
    pub fn num_labels(&self) -> usize {
        self.granularity.num_labels()
    }

    /// Reject a label space whose width disagrees with the granularity.
    pub fn check_label_space(&self, labels: usize) -> Result<(), ZooError> {
        if labels == self.num_labels() {
            Ok(())
        } else {
            Err(ZooError::LabelSpace {
                granularity: self.granularity,
                expected: self.num_labels(),
                actual: labels,
            })
        }
    }
}

impl fmt::Display for ModelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem())
    }
}

impl FromStr for ModelIdentity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Decoding stage that rejected a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Granularity,
    Superclass,
    Parameter(Parameter),
    /// The caller asked for a parameter the grammar does not define.
    ParameterName,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granularity => f.write_str("granularity"),
            Self::Superclass => f.write_str("superclass"),
            Self::Parameter(p) => write!(f, "parameter '{p}'"),
            Self::ParameterName => f.write_str("parameter name"),
        }
    }
}

/// A filename that could not be decoded. Every variant names the file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("{filename}: granularity not found (expected \"coarse\" or \"fine\")")]
    UnknownGranularity { filename: String },

    #[error("{filename}: no superclass token found")]
    SuperclassNotFound { filename: String },

    #[error("{filename}: ambiguous superclass, matched {}", .candidates.join(", "))]
    AmbiguousSuperclass {
        filename: String,
        candidates: Vec<String>,
    },

    #[error("{filename}: missing '{parameter}' token")]
    MissingParameter {
        filename: String,
        parameter: Parameter,
    },

    #[error("{filename}: '{parameter}' appears in more than one token")]
    DuplicateParameter {
        filename: String,
        parameter: Parameter,
    },

    #[error("{filename}: invalid value in '{token}' for '{parameter}'")]
    InvalidValue {
        filename: String,
        parameter: Parameter,
        token: String,
    },

    #[error("{filename}: unsupported parameter name '{name}'")]
    InvalidParameterName { filename: String, name: String },
}

impl IdentityError {
    pub fn filename(&self) -> &str {
        match self {
            Self::UnknownGranularity { filename }
            | Self::SuperclassNotFound { filename }
            | Self::AmbiguousSuperclass { filename, .. }
            | Self::MissingParameter { filename, .. }
            | Self::DuplicateParameter { filename, .. }
            | Self::InvalidValue { filename, .. }
            | Self::InvalidParameterName { filename, .. } => filename,
        }
    }

    pub fn stage(&self) -> ParseStage {
        match self {
            Self::UnknownGranularity { .. } => ParseStage::Granularity,
            Self::SuperclassNotFound { .. } | Self::AmbiguousSuperclass { .. } => {
                ParseStage::Superclass
            }
            Self::MissingParameter { parameter, .. }
            | Self::DuplicateParameter { parameter, .. }
            | Self::InvalidValue { parameter, .. } => ParseStage::Parameter(*parameter),
            Self::InvalidParameterName { .. } => ParseStage::ParameterName,
        }
    }
}

/// Strip directories, a recognized extension and the `model_` prefix.
pub fn model_stem(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let base = match base.rsplit_once('.') {
        Some((stem, ext)) if WEIGHT_EXTENSIONS.contains(&ext) => stem,
        _ => base,
    };
    base.strip_prefix(MODEL_PREFIX).unwrap_or(base)
}

/// Whether a file name follows the weight-file naming convention.
pub fn is_weight_file_name(name: &str) -> bool {
    name.starts_with(MODEL_PREFIX)
        && name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| WEIGHT_EXTENSIONS.contains(&ext))
}

/// Decode a model filename into its identity.
pub fn parse(filename: &str) -> Result<ModelIdentity, IdentityError> {
    let stem = model_stem(filename);

    let granularity = granularity_of(stem).ok_or_else(|| IdentityError::UnknownGranularity {
        filename: filename.to_string(),
    })?;

    let tokens: Vec<&str> = stem.split('_').filter(|t| !t.is_empty()).collect();
    let (superclass, consumed) = resolve_superclass(filename, granularity, &tokens)?;
    let remaining: Vec<&str> = tokens
        .iter()
        .zip(&consumed)
        .filter(|(_, used)| !**used)
        .map(|(t, _)| *t)
        .collect();

    let identity = ModelIdentity {
        granularity,
        superclass,
        crop_size: numeric_token(filename, &remaining, Parameter::Crop)?,
        kernel_size: numeric_token(filename, &remaining, Parameter::Kernel)?,
        width_factor: numeric_token(filename, &remaining, Parameter::Width)?,
        depth: numeric_token(filename, &remaining, Parameter::Depth)?,
    };
    tracing::debug!(filename, identity = %identity, "Decoded model identity");
    Ok(identity)
}

/// Decode the final component of a weight-file path.
pub fn parse_path(path: &Path) -> Result<ModelIdentity, IdentityError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy());
    parse(&name)
}

/// Extract a single named parameter from a filename.
///
/// `name` must be one of `class`, `crop`, `kernel`, `width`, `depth`. A
/// `class` token follows the superclass rules of [`parse`]: the index must be
/// a coarse index, and `class-1` (every superclass) yields `-1`.
pub fn extract_parameter(filename: &str, name: &str) -> Result<i64, IdentityError> {
    let parameter: Parameter = name.parse().map_err(|_| IdentityError::InvalidParameterName {
        filename: filename.to_string(),
        name: name.to_string(),
    })?;
    let tokens: Vec<&str> = model_stem(filename)
        .split('_')
        .filter(|t| !t.is_empty())
        .collect();
    if parameter != Parameter::Class {
        return numeric_token(filename, &tokens, parameter).map(i64::from);
    }

    let mut found = None;
    for token in &tokens {
        if let Some(superclass) = class_token(filename, token)? {
            if found.is_some() {
                return Err(IdentityError::DuplicateParameter {
                    filename: filename.to_string(),
                    parameter,
                });
            }
            found = Some(superclass);
        }
    }
    match found {
        Some(Superclass::Index(idx)) => Ok(i64::from(idx)),
        Some(Superclass::All) => Ok(-1),
        None => Err(IdentityError::MissingParameter {
            filename: filename.to_string(),
            parameter,
        }),
    }
}

fn granularity_of(stem: &str) -> Option<Granularity> {
    if stem.contains(Granularity::Coarse.as_str()) {
        Some(Granularity::Coarse)
    } else if stem.contains(Granularity::Fine.as_str()) {
        Some(Granularity::Fine)
    } else {
        None
    }
}

/// A superclass reference found in the token list.
struct Candidate {
    superclass: Superclass,
    text: String,
    start: usize,
    len: usize,
}

/// Resolve the superclass and mark which tokens it occupied.
fn resolve_superclass(
    filename: &str,
    granularity: Granularity,
    tokens: &[&str],
) -> Result<(Superclass, Vec<bool>), IdentityError> {
    let mut candidates = Vec::new();

    for (start, token) in tokens.iter().enumerate() {
        if *token == ALL_SUPERCLASSES_TOKEN {
            candidates.push(Candidate {
                superclass: Superclass::All,
                text: token.to_string(),
                start,
                len: 1,
            });
        } else if let Some(superclass) = class_token(filename, token)? {
            candidates.push(Candidate {
                superclass,
                text: token.to_string(),
                start,
                len: 1,
            });
        }
    }

    // Class names span several tokens; match them as aligned token runs.
    for (idx, name) in COARSE_CLASSES.iter().enumerate() {
        let parts: Vec<&str> = name.split('_').collect();
        for start in 0..tokens.len().saturating_sub(parts.len() - 1) {
            if tokens[start..start + parts.len()] == parts[..] {
                candidates.push(Candidate {
                    superclass: Superclass::Index(idx as u8),
                    text: name.to_string(),
                    start,
                    len: parts.len(),
                });
            }
        }
    }

    // Longest match wins when one run lies inside another.
    let spans: Vec<(usize, usize)> = candidates.iter().map(|c| (c.start, c.len)).collect();
    candidates.retain(|c| {
        !spans.iter().any(|&(start, len)| {
            len > c.len && start <= c.start && c.start + c.len <= start + len
        })
    });

    let mut distinct: Vec<&Candidate> = Vec::new();
    for candidate in &candidates {
        if !distinct.iter().any(|d| d.superclass == candidate.superclass) {
            distinct.push(candidate);
        }
    }

    let superclass = match distinct.as_slice() {
        [] if granularity == Granularity::Coarse => Superclass::All,
        [] => {
            return Err(IdentityError::SuperclassNotFound {
                filename: filename.to_string(),
            });
        }
        [only] => only.superclass,
        many => {
            return Err(IdentityError::AmbiguousSuperclass {
                filename: filename.to_string(),
                candidates: many.iter().map(|c| c.text.clone()).collect(),
            });
        }
    };

    let mut consumed = vec![false; tokens.len()];
    for candidate in &candidates {
        consumed[candidate.start..candidate.start + candidate.len].fill(true);
    }
    Ok((superclass, consumed))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Superclass named by a `class<idx>` token, `None` for any other token.
fn class_token(filename: &str, token: &str) -> Result<Option<Superclass>, IdentityError> {
    let Some(rest) = token.strip_prefix(Parameter::Class.prefix()) else {
        return Ok(None);
    };
    match rest {
        "-1" => Ok(Some(Superclass::All)),
        digits if is_digits(digits) => digits
            .parse::<usize>()
            .ok()
            .and_then(Superclass::from_index)
            .map(Some)
            .ok_or_else(|| IdentityError::InvalidValue {
                filename: filename.to_string(),
                parameter: Parameter::Class,
                token: token.to_string(),
            }),
        _ => Ok(None),
    }
}

fn numeric_token(filename: &str, tokens: &[&str], parameter: Parameter) -> Result<u32, IdentityError> {
    let mut matches = tokens
        .iter()
        .filter(|t| t.starts_with(parameter.prefix()));

    let token = matches.next().ok_or_else(|| IdentityError::MissingParameter {
        filename: filename.to_string(),
        parameter,
    })?;
    if matches.next().is_some() {
        return Err(IdentityError::DuplicateParameter {
            filename: filename.to_string(),
            parameter,
        });
    }

    let digits = &token[parameter.prefix().len()..];
    let digits = match digits.rsplit_once('.') {
        Some((value, ext)) if WEIGHT_EXTENSIONS.contains(&ext) => value,
        _ => digits,
    };
    match digits.parse::<u32>() {
        Ok(value) if value > 0 && is_digits(digits) => Ok(value),
        _ => Err(IdentityError::InvalidValue {
            filename: filename.to_string(),
            parameter,
            token: token.to_string(),
        }),
    }
}
