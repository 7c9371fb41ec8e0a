//! Scoring parameters and their loader.
//!
//! Parameters live in the key/value `config` table under the `scoring_`
//! prefix (`scoring_email_exists_points = 4`). Anything missing or malformed
//! keeps its built-in default.

use crate::models::ConfigRow;
use crate::store::JobStore;
use serde::Serialize;

/// Key prefix marking a `config` row as a scoring parameter.
pub const CONFIG_KEY_PREFIX: &str = "scoring_";

/// Weights and thresholds used by [`crate::scoring::score`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringConfig {
    /// Reserved. Not used by the current formula.
    pub audit_score_weight: f64,
    pub audit_score_threshold: f64,
    pub audit_score_points: f64,
    pub employee_count_min: f64,
    pub employee_count_max: f64,
    pub employee_count_points: f64,
    pub email_exists_points: f64,
    pub website_ssl_points: f64,
    pub company_size_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            audit_score_weight: 0.4,
            audit_score_threshold: 50.0,
            audit_score_points: 10.0,
            employee_count_min: 1.0,
            employee_count_max: 250.0,
            employee_count_points: 5.0,
            email_exists_points: 2.0,
            website_ssl_points: 3.0,
            company_size_bonus: 8.0,
        }
    }
}

/// Why a single override was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideError {
    UnknownKey,
    MissingValue,
    InvalidValue,
}

impl ScoringConfig {
    fn slot_mut(&mut self, name: &str) -> Option<&mut f64> {
        let slot = match name {
            "audit_score_weight" => &mut self.audit_score_weight,
            "audit_score_threshold" => &mut self.audit_score_threshold,
            "audit_score_points" => &mut self.audit_score_points,
            "employee_count_min" => &mut self.employee_count_min,
            "employee_count_max" => &mut self.employee_count_max,
            "employee_count_points" => &mut self.employee_count_points,
            "email_exists_points" => &mut self.email_exists_points,
            "website_ssl_points" => &mut self.website_ssl_points,
            "company_size_bonus" => &mut self.company_size_bonus,
            _ => return None,
        };
        Some(slot)
    }

    /// Apply one persisted override. `name` is the parameter name without the
    /// `scoring_` prefix. On error the current value is left untouched.
    pub fn apply_override(&mut self, name: &str, raw: Option<&str>) -> Result<(), OverrideError> {
        let slot = self.slot_mut(name).ok_or(OverrideError::UnknownKey)?;
        let raw = raw.ok_or(OverrideError::MissingValue)?;
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| OverrideError::InvalidValue)?;
        // "nan" and "inf" parse as floats but cannot take part in scoring
        if !value.is_finite() {
            return Err(OverrideError::InvalidValue);
        }
        *slot = value;
        Ok(())
    }

    /// Overlay `scoring_*` rows on top of the defaults. Bad rows are skipped
    /// with a warning.
    pub fn from_rows(rows: &[ConfigRow]) -> Self {
        let mut config = Self::default();
        for row in rows {
            let Some(name) = row.key.strip_prefix(CONFIG_KEY_PREFIX) else {
                continue;
            };
            match config.apply_override(name, row.value.as_deref()) {
                Ok(()) => {}
                Err(OverrideError::UnknownKey) => {
                    tracing::warn!("Ignoring unknown scoring config key {}", row.key);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid config value for {}: {:?}",
                        row.key,
                        row.value.as_deref().unwrap_or("NULL")
                    );
                }
            }
        }
        config
    }
}

/// Load the scoring configuration, falling back to defaults when the store
/// cannot be read.
pub async fn load<S: JobStore + ?Sized>(store: &S) -> ScoringConfig {
    match store.config_rows(CONFIG_KEY_PREFIX).await {
        Ok(rows) => {
            let config = ScoringConfig::from_rows(&rows);
            tracing::info!("Loaded scoring configuration: {:?}", config);
            config
        }
        Err(e) => {
            tracing::error!("Error loading scoring config, using defaults: {}", e);
            ScoringConfig::default()
        }
    }
}
