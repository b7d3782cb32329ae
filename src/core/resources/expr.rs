//! Wildcard query expressions for resource names and odates.
//!
//! `*` matches any run of name characters and `?` exactly one. Name
//! characters are the ones [`validate_name`](super::validate_name) accepts:
//! word characters, dashes and dots. The resulting pattern is anchored on
//! both ends.

use regex::Regex;

fn translate(pattern: &str, class: &str) -> Result<Regex, regex::Error> {
    if pattern.is_empty() {
        return Regex::new(&format!("^{class}*$|^$"));
    }
    let mut expr = String::with_capacity(pattern.len() * 4 + 2);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => {
                expr.push_str(class);
                expr.push('*');
            }
            '?' => {
                expr.push_str(class);
                expr.push_str("{1}");
            }
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}

/// Build a matcher for a resource name wildcard.
pub fn build_expr(pattern: &str) -> Result<Regex, regex::Error> {
    translate(pattern, r"[\w\-.]")
}

/// Build a matcher for an odate wildcard.
pub fn build_date_expr(pattern: &str) -> Result<Regex, regex::Error> {
    translate(pattern, r"\d")
}
