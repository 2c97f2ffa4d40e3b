//! Tree settings and node capacity derivation.

use log::warn;
use serde::{Deserialize, Serialize};

use super::entry::{Entry, Node};
use super::tree_constants::{
    DEFAULT_CACHE_PAGES, DEFAULT_MIN_FILL, DEFAULT_PAGE_SIZE, DEFAULT_REINSERT_FRACTION,
    MIN_CAPACITY, MIN_PAGE_SIZE, PAGE_CHECKSUM_BYTES, SMALL_CAPACITY,
};
use super::tree_types::{IndexError, IndexResult};

/// Which entries forced reinsertion removes from an overflowing node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReinsertVariant {
    /// The entries nearest to the node center
    Close,
    /// The entries farthest from the node center
    Far,
}

/// What happens to a non-root node exceeding its capacity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum OverflowTreatment {
    /// Always split
    Split,
    /// Once per level and top-level insert, remove `fraction` of the
    /// entries and insert them again from the root
    LimitedReinsert {
        fraction: f64,
        variant: ReinsertVariant,
    },
}

impl Default for OverflowTreatment {
    fn default() -> Self {
        OverflowTreatment::LimitedReinsert {
            fraction: DEFAULT_REINSERT_FRACTION,
            variant: ReinsertVariant::Far,
        }
    }
}

/// Construction options common to all trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TreeSettings {
    /// Page size in bytes, bounds the serialized size of a node
    pub page_size: usize,
    /// Overrides the capacity derived from the page size
    pub capacity: Option<usize>,
    /// Minimum fill fraction of non-root nodes
    pub min_fill: f64,
    pub overflow_treatment: OverflowTreatment,
    /// Build the first batch of objects with the bulk loader
    pub bulk_load: bool,
    /// Pages kept in memory by disk page files
    pub cache_pages: usize,
}

impl Default for TreeSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            capacity: None,
            min_fill: DEFAULT_MIN_FILL,
            overflow_treatment: OverflowTreatment::default(),
            bulk_load: false,
            cache_pages: DEFAULT_CACHE_PAGES,
        }
    }
}

impl TreeSettings {
    pub fn validate(&self) -> IndexResult<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(IndexError::Configuration(format!(
                "page size {} is below the minimum of {} bytes",
                self.page_size, MIN_PAGE_SIZE
            )));
        }
        if !(self.min_fill > 0.0 && self.min_fill <= 0.5) {
            return Err(IndexError::Configuration(format!(
                "minimum fill {} must be in (0, 0.5]",
                self.min_fill
            )));
        }
        if let OverflowTreatment::LimitedReinsert { fraction, .. } = self.overflow_treatment {
            if !(fraction > 0.0 && fraction <= 0.5) {
                return Err(IndexError::Configuration(format!(
                    "reinsert fraction {} must be in (0, 0.5]",
                    fraction
                )));
            }
        }
        if self.cache_pages == 0 {
            return Err(IndexError::Configuration(
                "the page cache must hold at least one page".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Capacities
// ============================================================================

/// Maximum and minimum entry counts of leaf and directory nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacities {
    pub leaf: usize,
    pub directory: usize,
    pub leaf_min: usize,
    pub directory_min: usize,
}

impl Capacities {
    /// Derives capacities from the page size and the serialized size of
    /// the largest leaf and directory entries.
    pub fn derive<L, R>(
        settings: &TreeSettings,
        example_leaf: &Entry<L, R>,
        example_directory: &Entry<L, R>,
    ) -> IndexResult<Self>
    where
        L: Serialize + Clone,
        R: Serialize + Clone,
    {
        settings.validate()?;

        let overhead = encoded_size(&Node::<L, R>::empty_leaf())? + PAGE_CHECKSUM_BYTES;
        let usable = settings.page_size.saturating_sub(overhead);
        let leaf_fit = usable / encoded_size(example_leaf)?.max(1);
        let directory_fit = usable / encoded_size(example_directory)?.max(1);

        let (leaf, directory) = match settings.capacity {
            Some(capacity) => {
                if capacity > leaf_fit || capacity > directory_fit {
                    return Err(IndexError::Configuration(format!(
                        "capacity {} does not fit into pages of {} bytes",
                        capacity, settings.page_size
                    )));
                }
                (capacity, capacity)
            }
            None => (leaf_fit, directory_fit),
        };

        for (kind, capacity) in [("leaf", leaf), ("directory", directory)] {
            if capacity <= MIN_CAPACITY {
                return Err(IndexError::Configuration(format!(
                    "{} capacity {} is too small, increase the page size {}",
                    kind, capacity, settings.page_size
                )));
            }
            if capacity < SMALL_CAPACITY {
                warn!(
                    "{} capacity {} is very small, consider a larger page size than {}",
                    kind, capacity, settings.page_size
                );
            }
        }

        Ok(Self::with_capacities(leaf, directory, settings.min_fill))
    }

    pub fn with_capacities(leaf: usize, directory: usize, min_fill: f64) -> Self {
        let min_of = |capacity: usize| ((capacity as f64 * min_fill).ceil() as usize).max(1);
        Self {
            leaf,
            directory,
            leaf_min: min_of(leaf),
            directory_min: min_of(directory),
        }
    }

    pub fn max_entries(&self, level: u32) -> usize {
        if level == 0 {
            self.leaf
        } else {
            self.directory
        }
    }

    pub fn min_entries(&self, level: u32) -> usize {
        if level == 0 {
            self.leaf_min
        } else {
            self.directory_min
        }
    }
}

fn encoded_size<T: Serialize>(value: &T) -> IndexResult<usize> {
    bincode::serde::encode_to_vec(value, bincode::config::legacy())
        .map(|bytes| bytes.len())
        .map_err(|e| IndexError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn examples() -> (Entry<Vec<f64>, u64>, Entry<Vec<f64>, u64>) {
        (Entry::leaf(1, vec![0.0, 0.0]), Entry::directory(1, 0))
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(TreeSettings::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_min_fill() {
        let settings = TreeSettings {
            min_fill: 0.75,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(IndexError::Configuration(_))
        ));
    }

    #[test]
    fn test_invalid_reinsert_fraction() {
        let settings = TreeSettings {
            overflow_treatment: OverflowTreatment::LimitedReinsert {
                fraction: 0.0,
                variant: ReinsertVariant::Close,
            },
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_derive_from_page_size() {
        let (leaf, dir) = examples();
        let caps = Capacities::derive(&TreeSettings::default(), &leaf, &dir).unwrap();
        // leaf: 4 tag + 8 id + 8 len + 16 coords = 36 bytes
        assert_eq!(caps.leaf, (4096 - 16) / 36);
        // directory: 4 tag + 8 child + 8 region = 20 bytes
        assert_eq!(caps.directory, (4096 - 16) / 20);
        assert_eq!(caps.leaf_min, (caps.leaf as f64 * 0.4).ceil() as usize);
    }

    #[test]
    fn test_explicit_capacity() {
        let (leaf, dir) = examples();
        let settings = TreeSettings {
            capacity: Some(4),
            ..Default::default()
        };
        let caps = Capacities::derive(&settings, &leaf, &dir).unwrap();
        assert_eq!(caps.leaf, 4);
        assert_eq!(caps.directory, 4);
        assert_eq!(caps.leaf_min, 2);
        assert_eq!(caps.max_entries(0), 4);
        assert_eq!(caps.min_entries(3), 2);
    }

    #[test]
    fn test_capacity_too_small() {
        let (leaf, dir) = examples();
        let settings = TreeSettings {
            capacity: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            Capacities::derive(&settings, &leaf, &dir),
            Err(IndexError::Configuration(_))
        ));

        // 4 tag + 8 id + 8 len + 32 coords = 52 bytes, two per page
        let wide: Entry<Vec<f64>, u64> = Entry::leaf(1, vec![0.0; 4]);
        let settings = TreeSettings {
            page_size: 128,
            ..Default::default()
        };
        assert!(Capacities::derive(&settings, &wide, &dir).is_err());
    }

    #[test]
    fn test_capacity_larger_than_page() {
        let (leaf, dir) = examples();
        let settings = TreeSettings {
            capacity: Some(1000),
            ..Default::default()
        };
        assert!(Capacities::derive(&settings, &leaf, &dir).is_err());
    }

    #[test]
    fn test_settings_from_json() {
        let json = r#"{
            "page-size": 8192,
            "min-fill": 0.3,
            "overflow-treatment": { "kind": "limited-reinsert", "fraction": 0.25, "variant": "close" }
        }"#;
        let settings: TreeSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.page_size, 8192);
        assert_eq!(settings.capacity, None);
        assert!(!settings.bulk_load);
        assert_eq!(settings.cache_pages, DEFAULT_CACHE_PAGES);
        assert_eq!(
            settings.overflow_treatment,
            OverflowTreatment::LimitedReinsert {
                fraction: 0.25,
                variant: ReinsertVariant::Close
            }
        );
        assert!(settings.validate().is_ok());
    }
}
