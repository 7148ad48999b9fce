use std::collections::BTreeMap;

use crate::model::{AlertEntry, MatchKey};

/// Separator between reasons of one key.
pub const REASON_SEPARATOR: &str = "; ";

/// All reasons of each alerted key, joined for display in alert order.
pub fn reasons_by_key(alerts: &[AlertEntry]) -> BTreeMap<MatchKey, String> {
    let mut grouped: BTreeMap<MatchKey, Vec<String>> = BTreeMap::new();
    for alert in alerts {
        grouped.entry(alert.key()).or_default().push(alert.reason.to_string());
    }

    grouped
        .into_iter()
        .map(|(key, reasons)| (key, reasons.join(REASON_SEPARATOR)))
        .collect()
}
