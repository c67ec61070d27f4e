//! Templating contract.
//!
//! When the caller supplies template data, the raw configuration text is
//! rendered through minijinja before structured parsing, so templating
//! always operates on text, never on the parsed tree.

use crate::error::ConfigError;

/// Render configuration text with the supplied data value.
pub fn render(text: &str, data: &serde_json::Value) -> Result<String, ConfigError> {
    let mut env = minijinja::Environment::new();
    // Rendering must be byte-faithful outside `{{ }}` spans; minijinja
    // drops the final newline unless told otherwise.
    env.set_keep_trailing_newline(true);
    env.add_template("config", text)?;
    let template = env.get_template("config")?;
    Ok(template.render(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_data_into_text() {
        let data = serde_json::json!({ "port": 7000, "host": "db.internal" });
        let out = render("host = \"{{ host }}\"\nport = {{ port }}\n", &data).unwrap();
        assert_eq!(out, "host = \"db.internal\"\nport = 7000\n");
    }

    #[test]
    fn template_errors_propagate() {
        let err = render("port = {{ port", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ConfigError::Template(_)));
    }
}
