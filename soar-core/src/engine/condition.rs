use serde_json::Value;
use tracing::debug;

use super::resolver::resolve_str;

/// Operators in match priority. Each must be surrounded by spaces.
const OPERATORS: [&str; 5] = ["==", "!=", ">", "<", "contains"];

/// Evaluates a single `left <op> right` comparison after resolving
/// placeholders against `context`. Anything unparseable is `false`.
pub fn evaluate(condition: &str, context: &Value) -> bool {
    let resolved = resolve_str(condition, context);

    for op in OPERATORS {
        let needle = format!(" {op} ");
        if let Some(index) = resolved.find(&needle) {
            let left = unquote(resolved[..index].trim());
            let right = unquote(resolved[index + needle.len()..].trim());
            let outcome = compare(op, left, right);
            debug!(condition = %resolved, operator = op, outcome, "Evaluated condition");
            return outcome;
        }
    }

    debug!(condition = %resolved, "No operator found in condition");
    false
}

fn compare(op: &str, left: &str, right: &str) -> bool {
    match op {
        "==" => left == right,
        "!=" => left != right,
        ">" => numeric(left, right).is_some_and(|(l, r)| l > r),
        "<" => numeric(left, right).is_some_and(|(l, r)| l < r),
        "contains" => left.contains(right),
        _ => false,
    }
}

fn numeric(left: &str, right: &str) -> Option<(f64, f64)> {
    let l = left.parse::<f64>().ok()?;
    let r = right.parse::<f64>().ok()?;
    Some((l, r))
}

/// Strips one pair of matching surrounding quotes.
fn unquote(operand: &str) -> &str {
    for quote in ['"', '\''] {
        if operand.len() >= 2 && operand.starts_with(quote) && operand.ends_with(quote) {
            return &operand[1..operand.len() - 1];
        }
    }
    operand
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "case": {"severity": "critical", "score": 87, "title": "Ransomware on FIN-DB"},
            "alert": {"source": "edr"}
        })
    }

    #[test]
    fn test_equality_after_resolution() {
        assert!(evaluate("{{case.severity}} == critical", &ctx()));
        assert!(evaluate("{{case.severity}} == \"critical\"", &ctx()));
        assert!(!evaluate("{{case.severity}} == low", &ctx()));
        assert!(evaluate("{{alert.source}} != 'email'", &ctx()));
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(evaluate("{{case.score}} > 80", &ctx()));
        assert!(!evaluate("{{case.score}} < 50", &ctx()));
        assert!(evaluate("2.5 < 10", &ctx()));
        assert!(!evaluate("{{case.severity}} > 3", &ctx()));
    }

    #[test]
    fn test_contains() {
        assert!(evaluate("{{case.title}} contains Ransomware", &ctx()));
        assert!(!evaluate("{{case.title}} contains phishing", &ctx()));
    }

    #[test]
    fn test_priority_follows_operator_order() {
        // "==" wins over "contains" even though both appear.
        assert!(evaluate("a contains b == a contains b", &ctx()));
    }

    #[test]
    fn test_operator_needs_surrounding_spaces() {
        assert!(!evaluate("{{case.severity}}==critical", &ctx()));
    }

    #[test]
    fn test_no_operator_is_false() {
        assert!(!evaluate("{{case.severity}}", &ctx()));
        assert!(!evaluate("", &ctx()));
        assert!(!evaluate("just some words", &json!({})));
    }

    #[test]
    fn test_unresolved_placeholder_compares_literally() {
        assert!(!evaluate("{{case.owner}} == alice", &ctx()));
        assert!(evaluate("{{case.owner}} == {{case.owner}}", &ctx()));
    }

    #[test]
    fn test_unquote_requires_matching_pair() {
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote("'x'"), "x");
        assert_eq!(unquote("\"x'"), "\"x'");
        assert_eq!(unquote("\""), "\"");
    }
}
