use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::default_major_task_codes;
use crate::error::GenerationError;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub expenses: ExpenseConfig,
    pub mandatory: MandatoryConfig,
}

pub const INVOICE_NUMBER_PLACEHOLDER: &str = "{invoice_number}";
pub const DEFAULT_LEDES_FILE_NAME: &str = "{invoice_number}.txt";

/// Fee/expense generation policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub fee_count: usize,
    pub expense_count: usize,
    /// Ceiling on hours per timekeeper per day
    pub max_daily_hours: f64,
    pub block_billing: bool,
    pub major_task_codes: Vec<String>,
    /// Output file name; `{invoice_number}` is replaced per invoice
    pub ledes_file_name: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fee_count: 20,
            expense_count: 5,
            max_daily_hours: 16.0,
            block_billing: false,
            major_task_codes: default_major_task_codes(),
            ledes_file_name: DEFAULT_LEDES_FILE_NAME.to_string(),
        }
    }
}

/// Expand a LEDES file name template for one invoice
pub fn ledes_file_name(template: &str, invoice_number: &str) -> String {
    template.replace(INVOICE_NUMBER_PLACEHOLDER, invoice_number)
}

/// Inclusive dollar range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountRange {
    pub min: f64,
    pub max: f64,
}

impl AmountRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    fn validate(&self, name: &str) -> Result<(), GenerationError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min < 0.0 || self.min > self.max
        {
            return Err(GenerationError::InvalidRange {
                name: name.to_string(),
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Per-category expense pricing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpenseConfig {
    /// Dollars per mile for local travel (E109)
    pub mileage_rate: f64,
    /// Out-of-town travel (E110)
    pub travel: AmountRange,
    /// Telephone (E105)
    pub telephone: AmountRange,
    /// Delivery services/messengers (E107)
    pub delivery: AmountRange,
    /// Postage (E108)
    pub postage: AmountRange,
    /// Meals (E111)
    pub meals: AmountRange,
    /// Unit cost for every other code
    pub other_rate: AmountRange,
    pub other_max_units: u32,
    /// Per-page copying rate (E101)
    pub copying_rate: AmountRange,
    pub copying_max_pages: u32,
}

impl Default for ExpenseConfig {
    fn default() -> Self {
        Self {
            mileage_rate: 0.65,
            travel: AmountRange::new(100.0, 800.0),
            telephone: AmountRange::new(5.0, 40.0),
            delivery: AmountRange::new(20.0, 100.0),
            postage: AmountRange::new(5.0, 50.0),
            meals: AmountRange::new(15.0, 150.0),
            other_rate: AmountRange::new(10.0, 150.0),
            other_max_units: 5,
            copying_rate: AmountRange::new(0.14, 0.25),
            copying_max_pages: 200,
        }
    }
}

impl ExpenseConfig {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !self.mileage_rate.is_finite() || self.mileage_rate < 0.0 {
            return Err(GenerationError::InvalidRange {
                name: "mileage_rate".to_string(),
                min: self.mileage_rate,
                max: self.mileage_rate,
            });
        }
        self.travel.validate("travel")?;
        self.telephone.validate("telephone")?;
        self.delivery.validate("delivery")?;
        self.postage.validate("postage")?;
        self.meals.validate("meals")?;
        self.other_rate.validate("other_rate")?;
        self.copying_rate.validate("copying_rate")?;
        Ok(())
    }
}

/// Description substring that pins a line to a named timekeeper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedAttribution {
    pub pattern: String,
    pub timekeeper: String,
}

/// Mandatory line selection and attribution rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MandatoryConfig {
    pub selected: Vec<String>,
    pub forced_attributions: Vec<ForcedAttribution>,
}

impl Default for MandatoryConfig {
    fn default() -> Self {
        Self {
            selected: Vec::new(),
            forced_attributions: vec![
                ForcedAttribution {
                    pattern: "kbcg".to_string(),
                    timekeeper: "Tom Delaganis".to_string(),
                },
                ForcedAttribution {
                    pattern: "john doe".to_string(),
                    timekeeper: "Ryan Kinsey".to_string(),
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Load configuration from the default location (.ledes-gen/config.yml)
    pub fn load_default() -> Result<Self> {
        Self::load(".ledes-gen/config.yml")
    }
}
