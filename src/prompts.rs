/// Wrapper the speech model reads aloud.
pub const SPEECH: &str = "Say clearly: {{text}}";

/// Title used for grounding sources the backend leaves untitled.
pub const UNTITLED_SOURCE: &str = "Source";

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}
