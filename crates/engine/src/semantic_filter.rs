//! `shouldCreateCandidate` (§4.7 step 3): name-pattern rejection applied
//! after type compatibility, independent of any statistics. Pure, so S5 is
//! directly unit-testable.

const NEVER_SOURCE_SUBSTRINGS: &[&str] = &["email", "password", "name", "description", "status", "type"];

/// `true` iff a column named `column_name` should never be treated as an FK
/// source, regardless of its features.
pub fn is_blocked_source_name(column_name: &str) -> bool {
    let lower = column_name.to_ascii_lowercase();
    NEVER_SOURCE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// For a source column ending in `_id`, the target table name must equal
/// the entity stem or its plural (`+s`, or `y → ies`).
fn entity_stem(source_column_name: &str) -> Option<&str> {
    source_column_name.strip_suffix("_id")
}

fn pluralizes_to(stem: &str, candidate: &str) -> bool {
    if candidate.eq_ignore_ascii_case(stem) {
        return true;
    }
    if candidate.eq_ignore_ascii_case(&format!("{stem}s")) {
        return true;
    }
    if let Some(without_y) = stem.strip_suffix('y') {
        return candidate.eq_ignore_ascii_case(&format!("{without_y}ies"));
    }
    false
}

/// `true` iff a candidate pair should be kept. `source_column_name` and
/// `target_table_name` drive the only two rules in §4.7 step 3: the
/// blocklist (always applied) and the `_id`-suffix plural-stem check
/// (applied only when the column name ends in `_id`).
pub fn should_create_candidate(source_column_name: &str, target_table_name: &str) -> bool {
    if is_blocked_source_name(source_column_name) {
        return false;
    }
    match entity_stem(source_column_name) {
        Some(stem) if !stem.is_empty() => pluralizes_to(stem, target_table_name),
        _ => true,
    }
}
