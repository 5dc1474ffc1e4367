//! Template rendering for YAML sources.
//!
//! Go-`text/template` syntax via gtmpl, so `{{ .Field }}` placeholders are
//! resolved against the caller-supplied data value. Rendering is purely
//! functional; the filename exists only for error context.

use gtmpl::{Context, Template, Value};

use crate::error::ApplyError;

pub(crate) fn render_template(
    filename: &str,
    source: &[u8],
    data: &Value,
) -> Result<Vec<u8>, ApplyError> {
    let text = std::str::from_utf8(source).map_err(|source| ApplyError::TemplateEncoding {
        file: filename.to_string(),
        source,
    })?;

    let mut template = Template::default();
    template.parse(text).map_err(|err| ApplyError::TemplateParse {
        file: filename.to_string(),
        message: err.to_string(),
    })?;

    let rendered = template
        .render(&Context::from(data.clone()))
        .map_err(|err| ApplyError::TemplateRender {
            file: filename.to_string(),
            message: err.to_string(),
        })?;

    Ok(rendered.into_bytes())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn namespace_data(namespace: &str) -> Value {
        let mut map = HashMap::new();
        map.insert(
            "Namespace".to_string(),
            Value::String(namespace.to_string()),
        );
        Value::Map(map)
    }

    #[test]
    fn renders_placeholders_from_the_data_object() {
        let rendered = render_template(
            "/dir/file1.yaml",
            b"hello {{ .Namespace }}",
            &namespace_data("le-namespace"),
        )
        .unwrap();
        assert_eq!(rendered, b"hello le-namespace");
    }

    #[test]
    fn parse_failure_carries_the_file_name() {
        let err = render_template(
            "/dir/file1.yaml",
            b"hello {{ .Namespace ",
            &namespace_data("le-namespace"),
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::TemplateParse { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to parse template for file /dir/file1.yaml"));
    }

    #[test]
    fn render_failure_carries_the_file_name() {
        // Field access through a scalar cannot be evaluated.
        let err = render_template(
            "/dir/file1.yaml",
            b"hello {{ .Namespace.Nested }}",
            &namespace_data("le-namespace"),
        )
        .unwrap_err();
        assert!(matches!(err, ApplyError::TemplateRender { .. }));
        assert!(err
            .to_string()
            .starts_with("failed to render template for file /dir/file1.yaml"));
    }

    #[test]
    fn non_utf8_template_is_rejected() {
        let err = render_template("/dir/file1.yaml", &[0xff, 0xfe], &namespace_data("x"))
            .unwrap_err();
        assert!(matches!(err, ApplyError::TemplateEncoding { .. }));
    }
}
