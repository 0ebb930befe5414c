//! Literal `${name}` template substitution.
//!
//! No conditionals, no loops. Placeholders without a value are left as-is.

/// Replace every `${key}` with its value
pub fn expand(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("${{{}}}", key), value);
    }
    out
}
