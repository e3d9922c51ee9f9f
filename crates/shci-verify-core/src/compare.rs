use crate::parse::{RdmIndex, SpatialRdm};
use serde::Serialize;

/// Outcome of a scalar (energy) comparison. Carries the delta so failures
/// are diagnosable without rerunning the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScalarComparison {
    pub computed: f64,
    pub reference: f64,
    pub delta: f64,
    pub tolerance: f64,
    pub passed: bool,
}

/// One deviating 2-RDM entry, identified by its exact orbital indices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RdmDeviation {
    pub index: RdmIndex,
    pub computed: f64,
    pub reference: f64,
    pub delta: f64,
}

/// Outcome of an entry-by-entry 2-RDM comparison. On failure the worst
/// offender (largest deviation) is reported alongside the failing count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RdmComparison {
    pub compared_entries: usize,
    pub failing_entries: usize,
    pub max_delta: f64,
    pub worst: Option<RdmDeviation>,
    pub tolerance: f64,
    pub passed: bool,
}

/// Structural disagreement between computed and reference 2-RDMs. A
/// distinct failure kind from a value mismatch; shapes must agree before
/// any numeric comparison happens, so misalignment can never surface as a
/// spurious numeric delta.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum ShapeMismatch {
    #[error("orbital dimension mismatch: computed {computed}, reference {reference}")]
    Dimension { computed: usize, reference: usize },
    #[error("entry {index:?} present only in computed output")]
    MissingInReference { index: RdmIndex },
    #[error("entry {index:?} present only in reference")]
    MissingInComputed { index: RdmIndex },
}

/// Absolute-difference comparison against the tolerance threshold.
pub fn compare_energy(computed: f64, reference: f64, tolerance: f64) -> ScalarComparison {
    let delta = (computed - reference).abs();
    ScalarComparison {
        computed,
        reference,
        delta,
        tolerance,
        passed: delta <= tolerance,
    }
}

/// Entry-by-entry comparison of two spatial 2-RDMs. Pure: identical inputs
/// always yield identical pass/fail and identical deltas.
pub fn compare_rdm(
    computed: &SpatialRdm,
    reference: &SpatialRdm,
    tolerance: f64,
) -> Result<RdmComparison, ShapeMismatch> {
    if computed.dimension() != reference.dimension() {
        return Err(ShapeMismatch::Dimension {
            computed: computed.dimension(),
            reference: reference.dimension(),
        });
    }

    for (index, _) in reference.entries() {
        if computed.get(index).is_none() {
            return Err(ShapeMismatch::MissingInComputed { index });
        }
    }

    let mut failing_entries = 0usize;
    let mut max_delta = 0.0f64;
    let mut worst: Option<RdmDeviation> = None;

    for (index, computed_value) in computed.entries() {
        let Some(reference_value) = reference.get(index) else {
            return Err(ShapeMismatch::MissingInReference { index });
        };
        let delta = (computed_value - reference_value).abs();

        if delta > max_delta || worst.is_none() {
            max_delta = max_delta.max(delta);
            worst = Some(RdmDeviation {
                index,
                computed: computed_value,
                reference: reference_value,
                delta,
            });
        }

        if delta > tolerance {
            failing_entries += 1;
        }
    }

    Ok(RdmComparison {
        compared_entries: computed.len(),
        failing_entries,
        max_delta,
        worst,
        tolerance,
        passed: failing_entries == 0,
    })
}

#[cfg(test)]
mod tests {
    use super::{ShapeMismatch, compare_energy, compare_rdm};
    use crate::parse::SpatialRdm;
    use std::collections::BTreeMap;

    fn rdm(dimension: usize, entries: &[([usize; 4], f64)]) -> SpatialRdm {
        SpatialRdm::new(dimension, entries.iter().copied().collect::<BTreeMap<_, _>>())
    }

    #[test]
    fn o2_det_energy_within_default_tolerance_passes() {
        let comparison = compare_energy(-149.608654, -149.608655, 1e-6);
        assert!(comparison.passed);
        assert!(comparison.delta <= 1e-6);
    }

    #[test]
    fn o2_det_energy_outside_tolerance_fails_with_delta() {
        let comparison = compare_energy(-149.608700, -149.608655, 1e-6);
        assert!(!comparison.passed);
        assert!((comparison.delta - 4.5e-5).abs() < 1e-9);
        assert_eq!(comparison.tolerance, 1e-6);
    }

    #[test]
    fn synthetic_violation_at_ten_tolerances_always_fails() {
        let reference = -149.608655;
        let tolerance = 1e-6;
        let comparison = compare_energy(reference + 10.0 * tolerance, reference, tolerance);
        assert!(!comparison.passed);
    }

    #[test]
    fn rdm_single_perturbed_entry_is_reported_with_its_index() {
        let mut entries = Vec::new();
        for i in 0..6usize {
            for j in 0..6usize {
                entries.push(([i, j, i, j], 0.01 * (i * 6 + j) as f64));
            }
        }
        let reference = rdm(6, &entries);

        let mut perturbed = entries.clone();
        for entry in &mut perturbed {
            if entry.0 == [3, 4, 3, 4] {
                entry.1 += 2e-6;
            }
        }
        let computed = rdm(6, &perturbed);

        let comparison = compare_rdm(&computed, &reference, 5e-7).expect("shapes should match");
        assert!(!comparison.passed);
        assert_eq!(comparison.failing_entries, 1);
        let worst = comparison.worst.expect("worst offender should be reported");
        assert_eq!(worst.index, [3, 4, 3, 4]);
        assert!((worst.delta - 2e-6).abs() < 1e-12);
    }

    #[test]
    fn rdm_comparison_is_idempotent() {
        let reference = rdm(2, &[([0, 0, 0, 0], 1.95), ([0, 1, 0, 1], 0.04)]);
        let computed = rdm(2, &[([0, 0, 0, 0], 1.95), ([0, 1, 0, 1], 0.0400004)]);

        let first = compare_rdm(&computed, &reference, 1e-6).expect("shapes should match");
        let second = compare_rdm(&computed, &reference, 1e-6).expect("shapes should match");
        assert_eq!(first, second);
        assert!(first.passed);
        assert!(first.max_delta > 0.0);
    }

    #[test]
    fn dimension_mismatch_is_a_shape_error_not_a_value_failure() {
        let computed = rdm(4, &[([0, 0, 0, 0], 1.0)]);
        let reference = rdm(6, &[([0, 0, 0, 0], 1.0)]);

        let error = compare_rdm(&computed, &reference, 1e-6).expect_err("shapes differ");
        assert_eq!(
            error,
            ShapeMismatch::Dimension {
                computed: 4,
                reference: 6
            }
        );
    }

    #[test]
    fn entry_missing_from_reference_is_a_shape_error_not_a_zero_delta() {
        let computed = rdm(2, &[([0, 0, 0, 0], 1.0), ([0, 1, 0, 1], 0.5)]);
        let reference = rdm(2, &[([0, 0, 0, 0], 1.0)]);

        let error = compare_rdm(&computed, &reference, 1e-6).expect_err("shapes differ");
        assert_eq!(
            error,
            ShapeMismatch::MissingInReference {
                index: [0, 1, 0, 1]
            }
        );
    }

    #[test]
    fn index_set_mismatch_never_pads_with_zeros() {
        let computed = rdm(2, &[([0, 0, 0, 0], 1.0)]);
        let reference = rdm(2, &[([0, 0, 0, 0], 1.0), ([0, 1, 0, 1], 0.0)]);

        let error = compare_rdm(&computed, &reference, 1e-6).expect_err("shapes differ");
        assert_eq!(
            error,
            ShapeMismatch::MissingInComputed {
                index: [0, 1, 0, 1]
            }
        );
    }

    #[test]
    fn matching_rdms_pass_and_report_entry_count() {
        let reference = rdm(2, &[([0, 0, 0, 0], 1.95), ([1, 1, 1, 1], 0.05)]);
        let comparison = compare_rdm(&reference, &reference, 1e-6).expect("shapes should match");
        assert!(comparison.passed);
        assert_eq!(comparison.compared_entries, 2);
        assert_eq!(comparison.failing_entries, 0);
    }
}
