use std::collections::HashSet;

use serde::Deserialize;

use crate::error::ReconError;

/// Default absolute tolerance for amount comparison (one cent).
pub const DEFAULT_AMOUNT_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub canonical: CanonicalConfig,
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Canonical
// ---------------------------------------------------------------------------

/// The authoritative XML set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CanonicalConfig {
    /// A `.xml` file, a `.zip` of XMLs or a directory. Absent means no data.
    #[serde(default)]
    pub path: Option<String>,
    /// File name prefixes that mark a cancelled document when the document
    /// itself carries no cancellation event.
    #[serde(default)]
    pub cancelled_prefixes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Secondary sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// Absent means the source is declared but not supplied for this run.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub scale: AmountScale,
    #[serde(default)]
    pub columns: ColumnOverrides,
}

impl SourceConfig {
    pub fn new(name: &str, scale: AmountScale) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            scale,
            columns: ColumnOverrides::default(),
        }
    }
}

/// How a source stores monetary amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountScale {
    /// Amounts are in currency units.
    #[default]
    #[serde(rename = "none")]
    Units,
    /// Amounts are always in cents.
    Cents,
    /// Decide per column with the cents heuristic.
    Detect,
}

impl std::fmt::Display for AmountScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Units => write!(f, "none"),
            Self::Cents => write!(f, "cents"),
            Self::Detect => write!(f, "detect"),
        }
    }
}

/// Explicit header names, taking precedence over the synonym table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ColumnOverrides {
    pub date: Option<String>,
    pub series: Option<String>,
    pub number: Option<String>,
    pub value: Option<String>,
    pub tax_base: Option<String>,
    pub tax_amount: Option<String>,
}

// ---------------------------------------------------------------------------
// Tolerance + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ToleranceConfig {
    #[serde(default = "default_amount_tolerance")]
    pub amount: f64,
}

fn default_amount_tolerance() -> f64 {
    DEFAULT_AMOUNT_TOLERANCE
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            amount: DEFAULT_AMOUNT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub json: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    /// Programmatic config with default tolerance and no file paths.
    pub fn new(name: &str, sources: Vec<SourceConfig>) -> Self {
        Self {
            name: name.to_string(),
            canonical: CanonicalConfig::default(),
            sources,
            tolerance: ToleranceConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        if self.sources.is_empty() {
            return Err(ReconError::ConfigValidation(
                "at least 1 secondary source is required".into(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(ReconError::ConfigValidation(
                    "source name must not be empty".into(),
                ));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ReconError::DuplicateSource(source.name.clone()));
            }
        }

        let tol = self.tolerance.amount;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance.amount must be a non-negative number, got {tol}"
            )));
        }

        Ok(())
    }

    /// Source names in declaration order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
name = "Janeiro 2026"

[canonical]
path = "xml/"
cancelled_prefixes = ["CANC"]

[[sources]]
name = "A"
path = "erp.csv"
scale = "cents"

[[sources]]
name = "B"
path = "fiscal.xlsx"
scale = "detect"

[sources.columns]
number = "Num. Doc"

[tolerance]
amount = 0.02
"#;

    #[test]
    fn parse_valid() {
        let config = ReconConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "Janeiro 2026");
        assert_eq!(config.canonical.path.as_deref(), Some("xml/"));
        assert_eq!(config.canonical.cancelled_prefixes, vec!["CANC"]);
        assert_eq!(config.source_names(), vec!["A", "B"]);
        assert_eq!(config.sources[0].scale, AmountScale::Cents);
        assert_eq!(config.sources[1].scale, AmountScale::Detect);
        assert_eq!(config.sources[1].columns.number.as_deref(), Some("Num. Doc"));
        assert!(config.sources[0].columns.number.is_none());
        assert_eq!(config.tolerance.amount, 0.02);
        assert!(config.output.json.is_none());
    }

    #[test]
    fn defaults_apply() {
        let input = r#"
name = "Minimal"

[[sources]]
name = "A"
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert!(config.canonical.path.is_none());
        assert!(config.canonical.cancelled_prefixes.is_empty());
        assert!(config.sources[0].path.is_none());
        assert_eq!(config.sources[0].scale, AmountScale::Units);
        assert_eq!(config.tolerance.amount, DEFAULT_AMOUNT_TOLERANCE);
    }

    #[test]
    fn scale_none_spelling() {
        let input = r#"
name = "Scale"

[[sources]]
name = "A"
scale = "none"
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.sources[0].scale, AmountScale::Units);
    }

    #[test]
    fn reject_unknown_scale() {
        let input = r#"
name = "Bad"

[[sources]]
name = "A"
scale = "millis"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_no_sources() {
        let input = r#"
name = "Bad"
sources = []
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("at least 1 secondary source"));
    }

    #[test]
    fn reject_duplicate_source() {
        let input = r#"
name = "Bad"

[[sources]]
name = "A"

[[sources]]
name = "A"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("'A'"));
    }

    #[test]
    fn reject_negative_tolerance() {
        let input = r#"
name = "Bad"

[[sources]]
name = "A"

[tolerance]
amount = -0.5
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("tolerance.amount"));
    }

    #[test]
    fn reject_empty_name() {
        let input = r#"
name = "  "

[[sources]]
name = "A"
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("name must not be empty"));
    }
}
