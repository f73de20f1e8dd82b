//! Builds the lobby service filter string from a session search.
//!
//! Grammar: clauses of the form `<key> <op> <value>` joined with ` and `, where `op` is one of
//! `eq ne gt ge lt le`. String values are single-quoted; numbers and booleans (`0`/`1`) are not.

use tracing::{debug, warn};

use super::search_keys::{SlotKind, is_search_key, slot_for_setting, slot_value};
use crate::settings::{SessionSearch, SettingValue};

/// Query names that select a search mode rather than filter lobbies.
const MODE_PARAMS: [&str; 2] = ["PRESENCESEARCH", "LOBBYSEARCH"];

fn quoted(value: &SettingValue) -> String {
    format!("'{value}'")
}

fn literal(value: &SettingValue) -> String {
    match value {
        SettingValue::Bool(b) => u8::from(*b).to_string(),
        SettingValue::Int(_) | SettingValue::Float(_) => value.to_string(),
        SettingValue::Str(_) => quoted(value),
    }
}

pub fn compose(search: &SessionSearch) -> String {
    let mut clauses = Vec::new();

    for (name, param) in &search.query {
        if param.value.is_empty() {
            continue;
        }
        if MODE_PARAMS.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            continue;
        }

        let op = param.op.filter_token().unwrap_or_else(|| {
            let kind: &'static str = param.op.into();
            warn!(param = %name, op = kind, "unsupported comparison, using eq");
            "eq"
        });

        if let Some(slot) = slot_for_setting(name) {
            let value = match slot.kind {
                SlotKind::Str => quoted(&param.value),
                SlotKind::Int => param.value.to_string(),
                SlotKind::Bool => match &param.value {
                    SettingValue::Bool(_) => slot_value(SlotKind::Bool, &param.value),
                    other => literal(other),
                },
            };
            clauses.push(format!("{} {op} {value}", slot.key));
        } else if is_search_key(name) {
            clauses.push(format!("{name} {op} {}", literal(&param.value)));
        } else {
            debug!(param = %name, "search parameter has no search key, dropped");
        }
    }

    clauses.join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ComparisonOp;

    #[test]
    fn table_settings_use_slots() {
        let mut search = SessionSearch::default();
        search.set("MAPNAME", "Harbor", ComparisonOp::Equals);
        search.set("NUMBOTS", 2, ComparisonOp::GreaterThanEquals);
        search.set("SECUREONLY", true, ComparisonOp::NotEquals);

        // BTreeMap order: MAPNAME, NUMBOTS, SECUREONLY
        assert_eq!(
            compose(&search),
            "string_key30 eq 'Harbor' and number_key30 ge 2 and number_key8 ne 1"
        );
    }

    #[test]
    fn prefixed_keys_quote_only_strings() {
        let mut search = SessionSearch::default();
        search.set("lobby/memberCount", 3, ComparisonOp::LessThan);
        search.set("string_key2", "eu", ComparisonOp::Equals);
        search.set("number_key2", 7, ComparisonOp::GreaterThan);

        assert_eq!(
            compose(&search),
            "lobby/memberCount lt 3 and number_key2 gt 7 and string_key2 eq 'eu'"
        );
    }

    #[test]
    fn skipped_and_defaulted_params() {
        let mut search = SessionSearch::default();
        search.set("PRESENCESEARCH", true, ComparisonOp::Equals);
        search.set("lobbysearch", true, ComparisonOp::Equals);
        search.set("GAMEMODE", "", ComparisonOp::Equals);
        search.set("FAVOURITECOLOUR", "red", ComparisonOp::Equals);
        search.set("REGION", "eu", ComparisonOp::Near);

        assert_eq!(compose(&search), "string_key28 eq 'eu'");
    }

    #[test]
    fn empty_search_is_empty_filter() {
        assert_eq!(compose(&SessionSearch::default()), "");
    }
}
