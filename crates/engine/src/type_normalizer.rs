//! Canonicalizes SQL type strings and classifies them for the candidate
//! pipeline (§4.1). Pure functions, no I/O.

/// Lowercases, strips a trailing `(...)` precision/length qualifier, and
/// strips a trailing `[]` array suffix.
pub fn normalize(data_type: &str) -> String {
    let lower = data_type.trim().to_ascii_lowercase();
    let without_array = lower.strip_suffix("[]").unwrap_or(&lower);
    let without_parens = match without_array.find('(') {
        Some(idx) => without_array[..idx].trim_end(),
        None => without_array,
    };
    without_parens.to_string()
}

const NUMERIC_FAMILIES: &[&str] = &[
    "int", "int2", "int4", "int8", "smallint", "integer", "bigint", "serial", "bigserial",
    "smallserial", "decimal", "numeric", "float", "float4", "float8", "real", "double precision",
    "money",
];

const EXCLUDED_FAMILIES: &[&str] = &[
    "timestamp",
    "timestamptz",
    "timestamp with time zone",
    "timestamp without time zone",
    "date",
    "time",
    "timetz",
    "interval",
    "bool",
    "boolean",
    "bytea",
    "blob",
    "json",
    "jsonb",
    "xml",
    "geometry",
    "geography",
    "point",
    "varchar",
    "character varying",
    "text",
];

/// Integer, serial, decimal, and float families.
pub fn is_numeric(data_type: &str) -> bool {
    let canonical = normalize(data_type);
    NUMERIC_FAMILIES.iter().any(|family| canonical == *family)
}

/// Temporal, boolean, binary/LOB, json/xml, geometry, and variable-length
/// char types are excluded from join candidacy.
pub fn is_excluded_for_join(data_type: &str) -> bool {
    let canonical = normalize(data_type);
    EXCLUDED_FAMILIES.iter().any(|family| canonical == *family)
}

/// After numeric exclusion, two types are compatible iff their canonical
/// forms are equal. Numeric-to-numeric pairs are unconditionally rejected
/// upstream by the candidate collector, not here — `compatible` only
/// judges textual equality so the rule stays symmetric and side-effect-free.
pub fn compatible(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
