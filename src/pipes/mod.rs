//! Pipe chains
//!
//! A pipe is a named transformation applied to a leaf's or object's resolved
//! value. Chains are declared inline in leaf strings
//! (`selector|name:arg;arg|name`), as the value of an object template's
//! pipe-chain key, or programmatically as structured `{name, args}` entries.
//! Execution is strictly sequential; a suspending pipe is awaited in place
//! before the next one runs.

mod builtins;

pub use builtins::default_registry;

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::error::MapError;
use crate::mapper::Options;
use crate::scope::Scope;

/// One step of a parsed pipe chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipeSpec {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl PipeSpec {
    /// The implicit pipe every leaf chain starts with.
    pub(crate) fn text() -> Self {
        Self {
            name: "text".to_string(),
            args: Vec::new(),
        }
    }
}

/// Everything a pipe sees for one step of a chain.
pub struct PipeInput<'a> {
    /// Output of the previous pipe; `Null` at the start of a leaf chain, the
    /// constructed object for an object-level chain.
    pub value: Value,
    /// Selector part of the leaf; `None` for object-level chains.
    pub selector: Option<&'a str>,
    /// Scope the leaf or object was resolved against.
    pub scope: &'a Scope<'a>,
    pub opts: &'a Options,
    /// This step's parsed args only, never a previous step's.
    pub args: &'a [String],
}

pub type PipeResult<'a> = LocalBoxFuture<'a, Result<Value, MapError>>;

/// A registered pipe function.
pub type PipeFn = Arc<dyn for<'a> Fn(PipeInput<'a>) -> PipeResult<'a> + Send + Sync>;

/// Pipe name to function mapping; merged once per call, read-only afterwards.
pub type PipeRegistry = HashMap<String, PipeFn>;

/// Normalize a pipe declaration into an ordered spec list.
///
/// Accepts a single delimiter-joined string, an array mixing entry strings
/// and structured `{name, args}` values, or a single structured value.
/// Malformed entries are dropped; parsing never fails.
pub fn parse_pipes(declared: &Value, delimiter: &str) -> Vec<PipeSpec> {
    match declared {
        Value::String(joined) => joined.split(delimiter).filter_map(parse_pipe_entry).collect(),
        Value::Array(entries) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(s) => parse_pipe_entry(s),
                other => structured_entry(other),
            })
            .collect(),
        other => structured_entry(other).into_iter().collect(),
    }
}

/// Parse a single `name[:arg1[;arg2…]]` entry. Splits on the first `:` only,
/// so the remaining colons belong to the argument text. Blank entries yield
/// nothing.
pub(crate) fn parse_pipe_entry(entry: &str) -> Option<PipeSpec> {
    if entry.trim().is_empty() {
        return None;
    }
    let (name, raw_args) = match entry.split_once(':') {
        Some((name, rest)) => (name, rest),
        None => (entry, ""),
    };
    let args = raw_args
        .split(';')
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(String::from)
        .collect();
    Some(PipeSpec {
        name: name.trim().to_string(),
        args,
    })
}

fn structured_entry(declared: &Value) -> Option<PipeSpec> {
    serde_json::from_value(declared.clone()).ok()
}

/// Run a parsed chain sequentially, left to right, against an evolving value.
///
/// Each step receives the previous step's output; suspension is awaited
/// before the next step starts. An unregistered name aborts the whole
/// mapping call.
pub async fn apply_pipes(
    specs: &[PipeSpec],
    initial: Value,
    selector: Option<&str>,
    scope: &Scope<'_>,
    opts: &Options,
) -> Result<Value, MapError> {
    let mut value = initial;
    for spec in specs {
        let func = opts
            .pipes
            .get(spec.name.as_str())
            .ok_or_else(|| MapError::PipeNotFound(spec.name.clone()))?;
        let input = PipeInput {
            value,
            selector,
            scope,
            opts,
            args: &spec.args,
        };
        value = func.as_ref()(input).await?;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, args: &[&str]) -> PipeSpec {
        PipeSpec {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn splits_a_joined_string_into_steps() {
        let specs = parse_pipes(&json!("trim|substr:0;5|upper"), "|");
        assert_eq!(
            specs,
            vec![spec("trim", &[]), spec("substr", &["0", "5"]), spec("upper", &[])]
        );
    }

    #[test]
    fn splits_on_the_first_colon_only() {
        let specs = parse_pipes(&json!("default:https://example.com;fallback"), "|");
        assert_eq!(
            specs,
            vec![spec("default", &["https://example.com", "fallback"])]
        );
    }

    #[test]
    fn trims_args_and_drops_empty_ones() {
        let specs = parse_pipes(&json!("pad: a ; ; b "), "|");
        assert_eq!(specs, vec![spec("pad", &["a", "b"])]);
    }

    #[test]
    fn a_pipe_without_args_is_valid() {
        let specs = parse_pipes(&json!("upper"), "|");
        assert_eq!(specs, vec![spec("upper", &[])]);
    }

    #[test]
    fn accepts_arrays_mixing_strings_and_structured_entries() {
        let specs = parse_pipes(
            &json!([{ "name": "default", "args": ["n/a"] }, "upper", { "name": "trim" }]),
            "|",
        );
        assert_eq!(
            specs,
            vec![spec("default", &["n/a"]), spec("upper", &[]), spec("trim", &[])]
        );
    }

    #[test]
    fn drops_malformed_entries_without_failing() {
        let specs = parse_pipes(&json!([42, "", "   ", { "args": [] }, { "name": 7 }, null]), "|");
        assert!(specs.is_empty());
    }
}
