use crate::model::{AlertReason, CandidateRecord, CanonicalRecord, CompareField, MatchStatus};

/// Reason for the lookup outcome itself, if it warrants one.
///
/// `Found` is silent; `Multiple` is informational and still proceeds to value
/// comparison.
pub fn outcome_reason(status: MatchStatus, source: &str) -> Option<AlertReason> {
    let source = source.to_string();
    match status {
        MatchStatus::SourceUnavailable => Some(AlertReason::SourceUnavailable { source }),
        MatchStatus::NotFound => Some(AlertReason::NotFound { source }),
        MatchStatus::Multiple => Some(AlertReason::MultipleCandidates { source }),
        MatchStatus::Found => None,
    }
}

/// Field-by-field comparison of a canonical record against its matched
/// candidate. Only fields present on both sides are compared.
pub fn divergences(
    canonical: &CanonicalRecord,
    candidate: &CandidateRecord,
    tolerance: f64,
) -> Vec<AlertReason> {
    let fields = [
        (CompareField::Value, canonical.value, candidate.value),
        (CompareField::TaxBase, canonical.tax_base, candidate.tax_base),
        (CompareField::TaxAmount, canonical.tax_amount, candidate.tax_amount),
    ];

    fields
        .into_iter()
        .filter(|(_, left, right)| !amounts_match(*left, *right, tolerance))
        .map(|(field, _, _)| AlertReason::Divergence {
            field,
            source: candidate.source.clone(),
        })
        .collect()
}

/// Absolute-tolerance equality. A missing side is never a divergence.
///
/// The comparison is inclusive, with a small relative epsilon so that decimal
/// boundaries (100.00 vs 100.01 at 0.01) survive binary float representation.
pub fn amounts_match(left: Option<f64>, right: Option<f64>, tolerance: f64) -> bool {
    match (left, right) {
        (Some(l), Some(r)) => {
            let delta = (l - r).abs();
            let scale = 1.0_f64.max(l.abs()).max(r.abs()).max(tolerance);
            let eps = f64::EPSILON * 16.0 * scale;
            delta <= tolerance + eps
        }
        _ => true,
    }
}
