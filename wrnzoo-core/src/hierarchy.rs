//! CIFAR-100 label hierarchy: the fixed fine (100) to coarse (20) taxonomy.
//!
//! All tables in this module are compile-time constants. The name/index maps are
//! built once on first access and shared read-only for the rest of the process,
//! so every consumer sees the same hierarchy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Number of fine-grained classes.
pub const NUM_FINE: usize = 100;

/// Number of coarse superclasses.
pub const NUM_COARSE: usize = 20;

/// Fine class names in canonical label order. Index = fine label id.
pub const FINE_CLASSES: [&str; NUM_FINE] = [
    "apple",
    "aquarium_fish",
    "baby",
    "bear",
    "beaver",
    "bed",
    "bee",
    "beetle",
    "bicycle",
    "bottle",
    "bowl",
    "boy",
    "bridge",
    "bus",
    "butterfly",
    "camel",
    "can",
    "castle",
    "caterpillar",
    "cattle",
    "chair",
    "chimpanzee",
    "clock",
    "cloud",
    "cockroach",
    "couch",
    "crab",
    "crocodile",
    "cup",
    "dinosaur",
    "dolphin",
    "elephant",
    "flatfish",
    "forest",
    "fox",
    "girl",
    "hamster",
    "house",
    "kangaroo",
    "keyboard",
    "lamp",
    "lawn_mower",
    "leopard",
    "lion",
    "lizard",
    "lobster",
    "man",
    "maple_tree",
    "motorcycle",
    "mountain",
    "mouse",
    "mushroom",
    "oak_tree",
    "orange",
    "orchid",
    "otter",
    "palm_tree",
    "pear",
    "pickup_truck",
    "pine_tree",
    "plain",
    "plate",
    "poppy",
    "porcupine",
    "possum",
    "rabbit",
    "raccoon",
    "ray",
    "road",
    "rocket",
    "rose",
    "sea",
    "seal",
    "shark",
    "shrew",
    "skunk",
    "skyscraper",
    "snail",
    "snake",
    "spider",
    "squirrel",
    "streetcar",
    "sunflower",
    "sweet_pepper",
    "table",
    "tank",
    "telephone",
    "television",
    "tiger",
    "tractor",
    "train",
    "trout",
    "tulip",
    "turtle",
    "wardrobe",
    "whale",
    "willow_tree",
    "wolf",
    "woman",
    "worm",
];

/// Coarse superclass names in canonical label order. Index = coarse label id.
pub const COARSE_CLASSES: [&str; NUM_COARSE] = [
    "aquatic_mammals",
    "fish",
    "flowers",
    "food_containers",
    "fruit_and_vegetables",
    "household_electrical_devices",
    "household_furniture",
    "insects",
    "large_carnivores",
    "large_man-made_outdoor_things",
    "large_natural_outdoor_scenes",
    "large_omnivores_and_herbivores",
    "medium_mammals",
    "non-insect_invertebrates",
    "people",
    "reptiles",
    "small_mammals",
    "trees",
    "vehicles_1",
    "vehicles_2",
];

/// Coarse label id for each fine label id.
pub const FINE_TO_COARSE: [usize; NUM_FINE] = [
    4, 1, 14, 8, 0, 6, 7, 7, 18, 3, //
    3, 14, 9, 18, 7, 11, 3, 9, 7, 11, //
    6, 11, 5, 10, 7, 6, 13, 15, 3, 15, //
    0, 11, 1, 10, 12, 14, 16, 9, 11, 5, //
    5, 19, 8, 8, 15, 13, 14, 17, 18, 10, //
    16, 4, 17, 4, 2, 0, 17, 4, 18, 17, //
    10, 3, 2, 12, 12, 16, 12, 1, 9, 19, //
    2, 10, 0, 1, 16, 12, 9, 13, 15, 13, //
    16, 19, 2, 4, 6, 19, 5, 5, 8, 19, //
    18, 1, 2, 15, 6, 0, 17, 8, 14, 13, //
];

/// Label granularity of a model or dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Coarse,
    Fine,
}

impl Granularity {
    /// Width of the label space at this granularity.
    pub fn num_labels(self) -> usize {
        match self {
            Self::Coarse => NUM_COARSE,
            Self::Fine => NUM_FINE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coarse => "coarse",
            Self::Fine => "fine",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coarse" => Ok(Self::Coarse),
            "fine" => Ok(Self::Fine),
            other => Err(format!("unknown granularity '{other}' (expected coarse or fine)")),
        }
    }
}

/// Errors raised by hierarchy lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("{granularity} label index {index} is out of range [0, {})", .granularity.num_labels())]
    IndexOutOfRange {
        granularity: Granularity,
        index: i64,
    },
}

/// Name/index views over the constant tables.
#[derive(Debug)]
pub struct LabelHierarchy {
    coarse_name_to_idx: HashMap<&'static str, usize>,
    fine_name_to_idx: HashMap<&'static str, usize>,
}

static HIERARCHY: LazyLock<LabelHierarchy> = LazyLock::new(|| LabelHierarchy {
    coarse_name_to_idx: COARSE_CLASSES
        .iter()
        .enumerate()
        .map(|(idx, name)| (*name, idx))
        .collect(),
    fine_name_to_idx: FINE_CLASSES
        .iter()
        .enumerate()
        .map(|(idx, name)| (*name, idx))
        .collect(),
});

impl LabelHierarchy {
    /// The process-wide hierarchy.
    pub fn get() -> &'static LabelHierarchy {
        &HIERARCHY
    }

    pub fn fine_classes(&self) -> &'static [&'static str] {
        &FINE_CLASSES
    }

    pub fn coarse_classes(&self) -> &'static [&'static str] {
        &COARSE_CLASSES
    }

    /// Coarse index for a superclass name.
    pub fn coarse_name_to_idx(&self, name: &str) -> Option<usize> {
        self.coarse_name_to_idx.get(name).copied()
    }

    /// Superclass name for a coarse index.
    pub fn coarse_idx_to_name(&self, idx: usize) -> Option<&'static str> {
        COARSE_CLASSES.get(idx).copied()
    }

    pub fn fine_name_to_idx(&self, name: &str) -> Option<usize> {
        self.fine_name_to_idx.get(name).copied()
    }

    /// Fine indices grouped under a coarse index, ascending.
    pub fn fine_members_of(&self, coarse: usize) -> Vec<usize> {
        FINE_TO_COARSE
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == coarse)
            .map(|(fine, _)| fine)
            .collect()
    }
}

/// Coarse label for a fine label.
pub fn coarse_index_of(fine_index: i64) -> Result<usize, HierarchyError> {
    usize::try_from(fine_index)
        .ok()
        .and_then(|idx| FINE_TO_COARSE.get(idx).copied())
        .ok_or(HierarchyError::IndexOutOfRange {
            granularity: Granularity::Fine,
            index: fine_index,
        })
}

/// Map fine targets to coarse targets elementwise.
///
/// Many fine labels share a coarse label, so the result cannot be mapped back.
pub fn remap_targets(targets: &[i64]) -> Result<Vec<usize>, HierarchyError> {
    targets.iter().map(|t| coarse_index_of(*t)).collect()
}

/// Human-readable class name at the given granularity.
pub fn class_name_for(granularity: Granularity, index: i64) -> Result<&'static str, HierarchyError> {
    let table: &[&'static str] = match granularity {
        Granularity::Coarse => &COARSE_CLASSES,
        Granularity::Fine => &FINE_CLASSES,
    };
    usize::try_from(index)
        .ok()
        .and_then(|idx| table.get(idx).copied())
        .ok_or(HierarchyError::IndexOutOfRange { granularity, index })
}
