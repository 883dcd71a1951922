//! Deterministic template expansion.
//!
//! Templates are a trivial in-process map. `{{key}}` tokens are
//! substituted via a small hand-written scanner; no `regex` dependency is
//! needed for a fixed two-character delimiter. Unknown keys expand to the
//! empty string, and an unknown `template_code` falls back to a generic
//! template. There is no fallible path: with first-party, compiled-in
//! templates, malformed template syntax cannot occur, so `render` returns
//! `String`, not `Result`.

use dn_common::Scalars;

const GENERIC_TEMPLATE: &str = "Hello {{name}}, you have a notification: {{message}}";

/// Returns the body template text for a `template_code`, or the generic
/// fallback if the code is unrecognized.
fn template_body(template_code: &str) -> &'static str {
    match template_code {
        "welcome_v1" => "Welcome, {{name}}! Confirm your account: {{link}}",
        "password_reset_v1" => "Hi {{name}}, reset your password here: {{link}}",
        "order_shipped_v1" => "{{name}}, your order {{order_id}} has shipped. Track it: {{link}}",
        _ => GENERIC_TEMPLATE,
    }
}

/// Expand `{{key}}` tokens in the template for `template_code` using
/// `variables`. Unknown keys expand to empty string.
pub fn render(template_code: &str, variables: &Scalars) -> String {
    expand(template_body(template_code), variables)
}

fn expand(template: &str, variables: &Scalars) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
            if let Some(end) = template[i + 2..].find("}}") {
                let key = template[i + 2..i + 2 + end].trim();
                out.push_str(&scalar_to_string(variables.get(key)));
                i += 2 + end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn scalar_to_string(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> Scalars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substitutes_known_keys() {
        let variables = vars(&[
            ("name", serde_json::json!("Ada")),
            ("link", serde_json::json!("https://x")),
        ]);
        let body = render("welcome_v1", &variables);
        assert!(body.contains("Ada"));
        assert!(body.contains("https://x"));
    }

    #[test]
    fn unknown_keys_expand_to_empty() {
        let body = render("welcome_v1", &Scalars::new());
        assert_eq!(body, "Welcome, ! Confirm your account: ");
    }

    #[test]
    fn unknown_template_code_falls_back_to_generic() {
        let variables = vars(&[("name", serde_json::json!("Ada")), ("message", serde_json::json!("hi"))]);
        let body = render("does_not_exist", &variables);
        assert_eq!(body, "Hello Ada, you have a notification: hi");
    }

    #[test]
    fn non_string_scalars_are_stringified() {
        let variables = vars(&[("name", serde_json::json!(42))]);
        let body = render("welcome_v1", &variables);
        assert!(body.contains("42"));
    }

    #[test]
    fn unterminated_delimiter_is_left_literal() {
        let body = expand("hi {{name", &Scalars::new());
        assert_eq!(body, "hi {{name");
    }
}
