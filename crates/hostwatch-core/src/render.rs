// ── Command template rendering ──
//
// Commands are minijinja templates. Undefined variables are errors, so a
// command never runs with a silently empty argument.

use minijinja::{Environment, UndefinedBehavior};

use crate::error::CoreError;
use crate::model::Variables;

fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

/// Render `template` with `variables`, requiring every name in `required`.
pub fn render_command(
    template: &str,
    variables: &Variables,
    required: &[String],
) -> Result<String, CoreError> {
    if let Some(missing) = required.iter().find(|name| !variables.contains_key(*name)) {
        return Err(CoreError::validation(format!(
            "missing required variable '{missing}'"
        )));
    }

    let rendered = environment().render_str(template, variables)?;
    let rendered = rendered.trim();
    if rendered.is_empty() {
        return Err(CoreError::validation("command rendered to an empty string"));
    }
    Ok(rendered.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn renders_variables() {
        let out = render_command(
            "systemctl restart {{ unit }}",
            &vars(&[("unit", json!("nginx"))]),
            &[],
        )
        .unwrap();
        assert_eq!(out, "systemctl restart nginx");
    }

    #[test]
    fn plain_command_passes_through() {
        let out = render_command("uptime", &Variables::new(), &[]).unwrap();
        assert_eq!(out, "uptime");
    }

    #[test]
    fn undefined_variable_is_validation_error() {
        let err = render_command("echo {{ nope }}", &Variables::new(), &[]).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }

    #[test]
    fn required_variable_checked_before_rendering() {
        let err = render_command("true", &Variables::new(), &["service".into()]).unwrap_err();
        assert!(err.to_string().contains("service"));
    }
}
