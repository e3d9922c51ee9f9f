use crate::domain::QuantityKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Built-in default tolerances, in the engine's energy units.
pub const DEFAULT_ENERGY_TOLERANCE: f64 = 1e-6;
pub const DEFAULT_RDM_TOLERANCE: f64 = 1e-6;

/// Per-quantity absolute tolerances. A quantity requested for validation
/// with no defined tolerance is a configuration error raised before any
/// engine execution, never a silent pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TolerancePolicy {
    energy: Option<f64>,
    spatial_rdm: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read tolerance policy '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse tolerance policy '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("tolerance for quantity '{quantity}' must be a positive finite number, got {value}")]
    InvalidTolerance { quantity: QuantityKind, value: f64 },
    #[error("no tolerance defined for quantity '{quantity}'")]
    MissingTolerance { quantity: QuantityKind },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPolicy {
    energy: Option<f64>,
    #[serde(rename = "spatialRdm")]
    spatial_rdm: Option<f64>,
}

impl TolerancePolicy {
    /// Policy used when no policy file is supplied.
    pub const fn builtin() -> Self {
        Self {
            energy: Some(DEFAULT_ENERGY_TOLERANCE),
            spatial_rdm: Some(DEFAULT_RDM_TOLERANCE),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, PolicyError> {
        let content = fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawPolicy =
            serde_json::from_str(&content).map_err(|source| PolicyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let policy = Self {
            energy: raw.energy,
            spatial_rdm: raw.spatial_rdm,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Resolves the tolerance for one check: a scenario override wins over
    /// the policy entry; having neither is the configuration error.
    pub fn resolve(
        &self,
        quantity: QuantityKind,
        scenario_override: Option<f64>,
    ) -> Result<f64, PolicyError> {
        if let Some(tolerance) = scenario_override {
            validate_tolerance(quantity, tolerance)?;
            return Ok(tolerance);
        }

        let configured = match quantity {
            QuantityKind::Energy => self.energy,
            QuantityKind::SpatialRdm => self.spatial_rdm,
        };
        configured.ok_or(PolicyError::MissingTolerance { quantity })
    }

    fn validate(&self) -> Result<(), PolicyError> {
        if let Some(tolerance) = self.energy {
            validate_tolerance(QuantityKind::Energy, tolerance)?;
        }
        if let Some(tolerance) = self.spatial_rdm {
            validate_tolerance(QuantityKind::SpatialRdm, tolerance)?;
        }
        Ok(())
    }
}

fn validate_tolerance(quantity: QuantityKind, value: f64) -> Result<(), PolicyError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PolicyError::InvalidTolerance { quantity, value });
    }
    Ok(())
}
