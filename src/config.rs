use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{BoqError, BoqResult};
use crate::layout::classifier::{DEFAULT_HEADER_KEYWORDS, DEFAULT_HEADER_TOKENS};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoqConfig {
    pub layout: LayoutConfig,
    pub classifier: ClassifierConfig,
    pub mapping: MappingConfig,
    pub quality: QualityConfig,
    pub materialize: MaterializeConfig,
    pub validation: ValidationConfig,
    pub statistics: StatisticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fragments whose Y rounds to the same bucket of this height share a row
    pub row_tolerance: f64,

    /// Rounded column starts closer than this to the previous boundary are merged
    pub column_merge_distance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Case-folded substrings that mark a header row
    pub header_keywords: Vec<String>,

    /// Case-folded labels that mark a header row only as a whole word
    pub header_tokens: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Keep the built-in bilingual synonyms and add `synonyms` on top
    pub extend_defaults: bool,

    /// Canonical field name (`itemCode`, `unitPrice`, ...) to accepted column names
    pub synonyms: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub missing_ratio_threshold: f64,
    pub invalid_ratio_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializeConfig {
    pub default_unit: String,

    /// Prefix of generated item codes (`PDF-001`, `PDF-002`, ...)
    pub code_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accept negative unit/total prices (rebates, credit lines)
    pub allow_negative_prices: bool,

    /// Relative difference tolerated between a stated total and quantity × unit price
    pub total_mismatch_tolerance: f64,

    pub deduplicate: bool,
    pub sort_by_code: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub outlier_threshold: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 2.0,
            column_merge_distance: 0.0,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            header_keywords: DEFAULT_HEADER_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            header_tokens: DEFAULT_HEADER_TOKENS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            extend_defaults: true,
            synonyms: BTreeMap::new(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            missing_ratio_threshold: 0.2,
            invalid_ratio_threshold: 0.1,
        }
    }
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            default_unit: "LOT".to_string(),
            code_prefix: "PDF".to_string(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allow_negative_prices: false,
            total_mismatch_tolerance: 0.01,
            deduplicate: true,
            sort_by_code: false,
        }
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            outlier_threshold: 2.0,
        }
    }
}

impl BoqConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> BoqResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BoqError::file_io(path.display().to_string(), e))?;

        let config: BoqConfig = toml::from_str(&content)
            .map_err(|e| BoqError::configuration(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Self {
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(tolerance) = std::env::var("BOQ_ROW_TOLERANCE") {
            if let Ok(value) = tolerance.parse::<f64>() {
                if value > 0.0 {
                    config.layout.row_tolerance = value;
                }
            }
        }

        if let Ok(threshold) = std::env::var("BOQ_OUTLIER_THRESHOLD") {
            if let Ok(value) = threshold.parse::<f64>() {
                config.statistics.outlier_threshold = value;
            }
        }

        if let Ok(unit) = std::env::var("BOQ_DEFAULT_UNIT") {
            if !unit.trim().is_empty() {
                config.materialize.default_unit = unit.trim().to_string();
            }
        }

        if let Ok(negative) = std::env::var("BOQ_ALLOW_NEGATIVE_PRICES") {
            config.validation.allow_negative_prices = negative.to_lowercase() == "true";
        }

        config
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> BoqResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| BoqError::configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| BoqError::file_io(path.display().to_string(), e))?;

        Ok(())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> BoqResult<()> {
        if !(self.layout.row_tolerance > 0.0) || !self.layout.row_tolerance.is_finite() {
            return Err(BoqError::configuration(format!(
                "layout.row_tolerance must be a positive number, got {}",
                self.layout.row_tolerance
            )));
        }
        if self.layout.column_merge_distance < 0.0 {
            return Err(BoqError::configuration("layout.column_merge_distance cannot be negative"));
        }
        if !(self.statistics.outlier_threshold > 0.0) {
            return Err(BoqError::configuration("statistics.outlier_threshold must be positive"));
        }
        if self.materialize.code_prefix.trim().is_empty() {
            return Err(BoqError::configuration("materialize.code_prefix cannot be empty"));
        }
        // Surfaces unknown field names in [mapping.synonyms]
        crate::mapping::SynonymTable::from_config(&self.mapping)?;
        Ok(())
    }
}
