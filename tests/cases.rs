//! Data-driven fixture cases
//!
//! Each directory under tests/fixtures pairs a content.html and a
//! template.json with the expected.json the mapper must produce. Custom
//! pipes used by the cases are registered below for every run.

use std::fs;
use std::path::Path;

use serde_json::Value;

use html_json_mapper::{map_str, MapError, Options, PipeInput, PipeResult};

/// Rewrite any http:// link into https://.
fn only_https(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        Ok(match input.value {
            Value::String(s) => {
                if let Some(rest) = s.strip_prefix("http://") {
                    Value::String(format!("https://{rest}"))
                } else {
                    Value::String(s)
                }
            }
            other => other,
        })
    })
}

/// Object-level pipe: reduce the object to nothing when any required
/// property is missing.
fn required_props(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        let missing = match input.value.as_object() {
            Some(fields) => input
                .args
                .iter()
                .any(|prop| fields.get(prop.as_str()).map_or(true, Value::is_null)),
            None => true,
        };
        Ok(if missing { Value::Null } else { input.value })
    })
}

fn fixture_options() -> Options {
    Options::default()
        .with_pipe("onlyHttps", only_https)
        .with_pipe("requiredProps", required_props)
}

#[tokio::test]
async fn fixture_cases_resolve_expected() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut cases: Vec<_> = fs::read_dir(&root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.is_dir())
        .collect();
    cases.sort();
    assert!(!cases.is_empty(), "no fixture cases found");

    for case in cases {
        let name = case.file_name().unwrap().to_string_lossy().into_owned();
        let content = fs::read_to_string(case.join("content.html")).unwrap();
        let template = fs::read_to_string(case.join("template.json")).unwrap();
        let expected: Value =
            serde_json::from_str(&fs::read_to_string(case.join("expected.json")).unwrap()).unwrap();

        let actual = map_str(&content, &template, &fixture_options())
            .await
            .unwrap_or_else(|err| panic!("case `{name}` failed: {err}"));
        assert_eq!(actual, expected, "case `{name}`");
    }
}

#[tokio::test]
async fn malformed_template_text_is_a_syntax_error() {
    let err = map_str("<html></html>", "{not json", &Options::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MapError::TemplateSyntax(_)));
}
