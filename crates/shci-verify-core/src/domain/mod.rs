pub mod errors;

pub use errors::{HarnessError, HarnessErrorCategory, HarnessResult};

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A numeric quantity the harness knows how to extract from an engine run
/// and validate against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Energy,
    SpatialRdm,
}

impl QuantityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Energy => "energy",
            Self::SpatialRdm => "spatial_rdm",
        }
    }

    /// Output artifact the engine writes for this quantity.
    pub const fn output_artifact(self) -> &'static str {
        match self {
            Self::Energy => "shci.e",
            Self::SpatialRdm => "spatialRDM.0.0.txt",
        }
    }

    /// Reference artifact bundled with the scenario inputs.
    pub const fn reference_artifact(self) -> &'static str {
        match self {
            Self::Energy => "trustedE.txt",
            Self::SpatialRdm => "trusted2RDM.txt",
        }
    }
}

impl Display for QuantityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
