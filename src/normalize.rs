//! # Normalize
//!
//! Grammar enforcement for metric keys, dimension keys and dimension values
//!
//! <https://docs.dynatrace.com/docs/extend-dynatrace/extend-metrics/reference/metric-ingestion-protocol>

/// Metric keys are truncated to this many characters before normalization
pub const MAX_METRIC_KEY_LENGTH: usize = 250;

/// Dimension keys are truncated to this many characters before normalization
pub const MAX_DIMENSION_KEY_LENGTH: usize = 100;

/// Dimension values are truncated to this many characters before escaping
pub const MAX_DIMENSION_VALUE_LENGTH: usize = 250;

/// Normalize a metric key
///
/// Sections between dots keep `[A-Za-z0-9_-]`, runs of anything else collapse into a single `_`
/// and trailing runs are dropped. The first section must start with `[A-Za-z_]`, the others with
/// `[A-Za-z0-9_]`, leading characters that don't are stripped. Empty sections are dropped, an empty
/// first section empties the whole key.
///
/// ```
/// use metrics_dynatrace::normalize::normalize_metric_key;
///
/// assert_eq!(normalize_metric_key("~0some#~key..0b"), "some_key.0b");
/// assert_eq!(normalize_metric_key("0.section"), "");
/// ```
pub fn normalize_metric_key(raw: &str) -> String {
    let mut sections = truncate(raw, MAX_METRIC_KEY_LENGTH).split('.');

    let mut key = match sections.next() {
        Some(first) => normalize_section(first, is_metric_key_first_start, is_metric_key_char),
        None => return String::new(),
    };
    if key.is_empty() {
        return key;
    }

    for section in sections {
        let section = normalize_section(section, is_metric_key_section_start, is_metric_key_char);
        if !section.is_empty() {
            key.push('.');
            key.push_str(&section);
        }
    }

    key
}

/// Normalize a dimension key
///
/// Like metric keys but every section is lowercased first, must start with `[a-z_]` and may
/// contain `[a-z0-9_:-]`. Returns an empty string when nothing survives, callers drop such
/// dimensions entirely.
pub fn normalize_dimension_key(raw: &str) -> String {
    let mut key = String::new();

    for section in truncate(raw, MAX_DIMENSION_KEY_LENGTH).split('.') {
        let section = normalize_section(&section.to_lowercase(), is_dimension_key_start, is_dimension_key_char);
        if section.is_empty() {
            continue;
        }
        if !key.is_empty() {
            key.push('.');
        }
        key.push_str(&section);
    }

    key
}

/// Normalize and escape a dimension value
///
/// Truncates first so an escape backslash can never be cut off from the character it escapes.
/// Leading and trailing runs of control characters are removed, inner runs become a single `_`,
/// then `=`, ` `, `,` and `\` are escaped with a backslash.
pub fn normalize_dimension_value(raw: &str) -> String {
    let trimmed = truncate(raw, MAX_DIMENSION_VALUE_LENGTH).trim_matches(char::is_control);

    let mut value = String::with_capacity(trimmed.len());
    let mut in_control_run = false;
    for c in trimmed.chars() {
        if c.is_control() {
            in_control_run = true;
            continue;
        }
        if in_control_run {
            value.push('_');
            in_control_run = false;
        }
        if needs_escape(c) {
            value.push('\\');
        }
        value.push(c);
    }

    value
}

fn needs_escape(c: char) -> bool {
    matches!(c, '=' | ' ' | ',' | '\\')
}

/// Cut `raw` down to at most `max_chars` characters (not bytes)
fn truncate(raw: &str, max_chars: usize) -> &str {
    match raw.char_indices().nth(max_chars) {
        Some((index, _)) => &raw[..index],
        None => raw,
    }
}

/// Strip leading characters failing `start`, then collapse runs failing `allowed` into `_`.
/// A run is only written once a legal character follows it, so trailing runs vanish.
fn normalize_section(section: &str, start: fn(char) -> bool, allowed: fn(char) -> bool) -> String {
    let section = section.trim_start_matches(|c: char| !start(c));

    let mut normalized = String::with_capacity(section.len());
    let mut in_illegal_run = false;
    for c in section.chars() {
        if !allowed(c) {
            in_illegal_run = true;
            continue;
        }
        if in_illegal_run {
            normalized.push('_');
            in_illegal_run = false;
        }
        normalized.push(c);
    }

    normalized
}

fn is_metric_key_first_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_metric_key_section_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_metric_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_dimension_key_start(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

fn is_dimension_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | ':')
}
