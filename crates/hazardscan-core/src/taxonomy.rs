//! The hazard taxonomy: candidate tags offered to the scorer and the named
//! categories the report groups them into.
//!
//! A `Taxonomy` is built once at startup and shared read-only for the whole
//! batch, so every image is scored against the identical candidate set.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::report::{DIAGNOSTICS_COLUMN, IMAGE_COLUMN, OBJECTS_COLUMN};

/// Candidate tags of the built-in home-environment taxonomy, in scoring order.
const BUILTIN_TAGS: &[&str] = &[
    "air freshener",
    "bleach",
    "dryer sheet",
    "plastic water bottle",
    "fragrance",
    "cleaning spray",
    "kitty litter",
    "candle",
    "fabric softener",
    "Teflon pan",
    "pet food",
    "pet bedding",
    "visible mold",
    "humidifier",
    "mildew",
    "vinyl shower curtain",
    "chemical detergent",
    "pesticide",
    "weed killer",
    "air purifier",
    "plants",
    "HEPA filter",
    "glass container",
    "organic cleaner",
    "BPA bottle",
];

/// Built-in categories, in report column order.
const BUILTIN_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Xenoestrogens",
        &[
            "dryer sheet",
            "fragrance",
            "plastic water bottle",
            "fabric softener",
            "vinyl shower curtain",
        ],
    ),
    (
        "Mold Triggers",
        &["visible mold", "humidifier", "mildew", "kitty litter"],
    ),
    ("Pet Hazards", &["kitty litter", "pet food", "pet bedding"]),
    (
        "Carcinogens",
        &[
            "bleach",
            "cleaning spray",
            "pesticide",
            "weed killer",
            "Teflon pan",
        ],
    ),
    (
        "Safe Items",
        &[
            "air purifier",
            "plants",
            "HEPA filter",
            "glass container",
            "organic cleaner",
        ],
    ),
];

/// A named group of tags used as one report column.
#[derive(Debug, Clone)]
pub struct Category {
    name: String,
    tags: Vec<String>,
    members: HashSet<String>,
}

impl Category {
    fn new(name: impl Into<String>, tags: Vec<String>) -> Self {
        let members = tags.iter().cloned().collect();
        Self {
            name: name.into(),
            tags,
            members,
        }
    }

    /// Column name of this category.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member tags in declaration order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Whether `tag` belongs to this category.
    pub fn contains(&self, tag: &str) -> bool {
        self.members.contains(tag)
    }
}

/// On-disk taxonomy layout.
///
/// ```toml
/// tags = ["visible mold", "kitty litter"]
///
/// [[categories]]
/// name = "Mold Triggers"
/// tags = ["visible mold", "kitty litter"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyFile {
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<CategoryDef>,
}

/// One `[[categories]]` entry of a taxonomy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    pub tags: Vec<String>,
}

/// Immutable tag list plus category membership.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    tags: Vec<String>,
    categories: Vec<Category>,
}

impl Taxonomy {
    /// The built-in home-environment hazard taxonomy.
    pub fn builtin() -> Self {
        Self {
            tags: BUILTIN_TAGS.iter().map(|t| t.to_string()).collect(),
            categories: BUILTIN_CATEGORIES
                .iter()
                .map(|(name, tags)| Category::new(*name, tags.iter().map(|t| t.to_string()).collect()))
                .collect(),
        }
    }

    /// Load a taxonomy from a TOML file, validating its structure.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: TaxonomyFile = toml::from_str(&content).map_err(|e| ConfigError::Taxonomy {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_definition(file).map_err(|message| ConfigError::Taxonomy {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Build a taxonomy from a parsed definition.
    ///
    /// Rejects empty or duplicate tags, duplicate or blank category names,
    /// category names that collide with the fixed report columns, and
    /// category members missing from the tag list.
    pub fn from_definition(file: TaxonomyFile) -> Result<Self, String> {
        if file.tags.is_empty() {
            return Err("tag list is empty".to_string());
        }

        let mut seen = HashSet::new();
        for tag in &file.tags {
            if tag.trim().is_empty() {
                return Err("tags must not be blank".to_string());
            }
            if !seen.insert(tag.as_str()) {
                return Err(format!("duplicate tag {tag:?}"));
            }
        }

        let mut names = HashSet::new();
        let mut categories = Vec::with_capacity(file.categories.len());
        for def in file.categories {
            if def.name.trim().is_empty() {
                return Err("category names must not be blank".to_string());
            }
            if [IMAGE_COLUMN, OBJECTS_COLUMN, DIAGNOSTICS_COLUMN].contains(&def.name.as_str()) {
                return Err(format!(
                    "category {:?} clashes with a report column of the same name",
                    def.name
                ));
            }
            if !names.insert(def.name.clone()) {
                return Err(format!("duplicate category {:?}", def.name));
            }
            if let Some(unknown) = def.tags.iter().find(|t| !seen.contains(t.as_str())) {
                return Err(format!(
                    "category {:?} lists {unknown:?}, which is not in the tag list",
                    def.name
                ));
            }
            categories.push(Category::new(def.name, def.tags));
        }

        Ok(Self {
            tags: file.tags,
            categories,
        })
    }

    /// Resolve the taxonomy for a run: the configured file, or the built-in set.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let taxonomy = Self::from_file(path)?;
                tracing::info!(
                    "Loaded taxonomy from {:?} ({} tags, {} categories)",
                    path,
                    taxonomy.tags.len(),
                    taxonomy.categories.len()
                );
                Ok(taxonomy)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// All candidate tags in scoring order.
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Categories in report column order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Look up a category by name.
    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Names of the categories a tag belongs to (possibly none).
    pub fn categories_of<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.categories
            .iter()
            .filter(move |c| c.contains(tag))
            .map(|c| c.name())
    }

    /// Convert back to the on-disk layout.
    pub fn to_definition(&self) -> TaxonomyFile {
        TaxonomyFile {
            tags: self.tags.clone(),
            categories: self
                .categories
                .iter()
                .map(|c| CategoryDef {
                    name: c.name.clone(),
                    tags: c.tags.clone(),
                })
                .collect(),
        }
    }
}
