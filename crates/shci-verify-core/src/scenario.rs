use crate::domain::QuantityKind;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// One validation check a scenario declares. A disabled check must carry a
/// documented reason; silently omitting a check is not representable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
    pub quantity: QuantityKind,
    /// Per-scenario tolerance override; the policy default applies when absent.
    pub tolerance: Option<f64>,
    /// When present, the check is skipped and the reason is reported.
    #[serde(rename = "skipReason")]
    pub skip_reason: Option<String>,
}

impl CheckSpec {
    pub fn is_active(&self) -> bool {
        self.skip_reason.is_none()
    }
}

/// A named test scenario: a workspace directory relative to the base test
/// directory plus the set of quantities to validate. Immutable during a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    pub directory: String,
    pub checks: Vec<CheckSpec>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioManifest {
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read scenario manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse scenario manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("manifest declares no scenarios")]
    Empty,
    #[error("scenario name '{name}' appears more than once")]
    DuplicateName { name: String },
    #[error("scenario '{name}' has an empty directory")]
    EmptyDirectory { name: String },
    #[error("scenario '{name}' declares no checks")]
    NoChecks { name: String },
    #[error("scenario '{name}' declares quantity '{quantity}' more than once")]
    DuplicateCheck { name: String, quantity: QuantityKind },
    #[error("scenario '{name}' skips '{quantity}' without a documented reason")]
    UndocumentedSkip { name: String, quantity: QuantityKind },
    #[error("scenario '{name}' was not found in the manifest")]
    UnknownScenario { name: String },
}

impl ScenarioManifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content).map_err(|error| match error {
            ManifestError::Parse { source, .. } => ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_json::from_str(content).map_err(|source| ManifestError::Parse {
                path: PathBuf::from("<inline-manifest>"),
                source,
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn find(&self, name: &str) -> Result<&Scenario, ManifestError> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.name == name)
            .ok_or_else(|| ManifestError::UnknownScenario {
                name: name.to_string(),
            })
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.scenarios.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen_names = BTreeSet::new();
        for scenario in &self.scenarios {
            if !seen_names.insert(scenario.name.as_str()) {
                return Err(ManifestError::DuplicateName {
                    name: scenario.name.clone(),
                });
            }
            if scenario.directory.trim().is_empty() {
                return Err(ManifestError::EmptyDirectory {
                    name: scenario.name.clone(),
                });
            }
            if scenario.checks.is_empty() {
                return Err(ManifestError::NoChecks {
                    name: scenario.name.clone(),
                });
            }

            let mut seen_quantities = BTreeSet::new();
            for check in &scenario.checks {
                if !seen_quantities.insert(check.quantity) {
                    return Err(ManifestError::DuplicateCheck {
                        name: scenario.name.clone(),
                        quantity: check.quantity,
                    });
                }
                if let Some(reason) = &check.skip_reason
                    && reason.trim().is_empty()
                {
                    return Err(ManifestError::UndocumentedSkip {
                        name: scenario.name.clone(),
                        quantity: check.quantity,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{ManifestError, ScenarioManifest};
    use crate::domain::QuantityKind;

    #[test]
    fn parses_a_scenario_with_override_and_skip() {
        let manifest = ScenarioManifest::from_json(
            r#"
            {
              "scenarios": [
                {
                  "name": "c2_pt_rdm",
                  "directory": "c2_pt_rdm",
                  "checks": [
                    {
                      "quantity": "energy",
                      "skipReason": "perturbative references not regenerated upstream"
                    },
                    { "quantity": "spatial_rdm", "tolerance": 5e-7 }
                  ]
                }
              ]
            }
            "#,
        )
        .expect("manifest should parse");

        let scenario = manifest.find("c2_pt_rdm").expect("scenario should exist");
        assert_eq!(scenario.directory, "c2_pt_rdm");
        assert_eq!(scenario.checks.len(), 2);
        assert!(!scenario.checks[0].is_active());
        assert!(scenario.checks[1].is_active());
        assert_eq!(scenario.checks[1].tolerance, Some(5e-7));
    }

    #[test]
    fn skip_without_reason_fails_validation() {
        let error = ScenarioManifest::from_json(
            r#"
            {
              "scenarios": [
                {
                  "name": "n2_pt_rdm",
                  "directory": "n2_pt_rdm",
                  "checks": [ { "quantity": "energy", "skipReason": "  " } ]
                }
              ]
            }
            "#,
        )
        .expect_err("blank skip reason must be rejected");

        assert!(matches!(
            error,
            ManifestError::UndocumentedSkip {
                quantity: QuantityKind::Energy,
                ..
            }
        ));
    }

    #[test]
    fn duplicate_scenario_names_are_rejected() {
        let error = ScenarioManifest::from_json(
            r#"
            {
              "scenarios": [
                { "name": "o2_det", "directory": "o2_det", "checks": [{ "quantity": "energy" }] },
                { "name": "o2_det", "directory": "other", "checks": [{ "quantity": "energy" }] }
              ]
            }
            "#,
        )
        .expect_err("duplicate names must be rejected");
        assert!(matches!(error, ManifestError::DuplicateName { .. }));
    }

    #[test]
    fn scenario_without_checks_is_rejected() {
        let error = ScenarioManifest::from_json(
            r#"{ "scenarios": [ { "name": "o2_det", "directory": "o2_det", "checks": [] } ] }"#,
        )
        .expect_err("empty checks must be rejected");
        assert!(matches!(error, ManifestError::NoChecks { .. }));
    }

    #[test]
    fn unknown_scenario_lookup_reports_the_name() {
        let manifest = ScenarioManifest::from_json(
            r#"{ "scenarios": [ { "name": "o2_det", "directory": "o2_det", "checks": [{ "quantity": "energy" }] } ] }"#,
        )
        .expect("manifest should parse");
        let error = manifest.find("o2_stoc").expect_err("lookup should fail");
        assert!(matches!(error, ManifestError::UnknownScenario { name } if name == "o2_stoc"));
    }
}
