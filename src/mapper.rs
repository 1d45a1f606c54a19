//! Template walking
//!
//! The recursive core: object templates narrow the scope and produce one
//! result per matched element, array templates collect entries from their
//! sub-templates and restore document order, leaves resolve through pipe
//! chains. Options are merged once per top-level call and threaded through
//! unchanged.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use scraper::Html;
use serde_json::{Map, Value};

use crate::error::MapError;
use crate::pipes::{
    apply_pipes, default_registry, parse_pipe_entry, parse_pipes, PipeFn, PipeInput, PipeRegistry,
    PipeResult, PipeSpec,
};
use crate::scope::Scope;

/// Position key for array elements that are not object templates.
const SYNTHETIC_KEY: &str = "_";

/// Per-call configuration. Built once at the top level (caller overrides win
/// over built-ins) and never mutated during the walk; concurrent calls each
/// own their registry.
#[derive(Clone)]
pub struct Options {
    /// Reserved object key holding the scope selector
    pub select_key: String,
    /// Reserved object key holding the object pipe chain; doubles as the
    /// chain delimiter inside leaf strings
    pub pipe_key: String,
    /// Merged pipe registry
    pub pipes: PipeRegistry,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            select_key: "$".to_string(),
            pipe_key: "|".to_string(),
            pipes: default_registry(),
        }
    }
}

impl Options {
    pub fn with_select_key(mut self, key: impl Into<String>) -> Self {
        self.select_key = key.into();
        self
    }

    pub fn with_pipe_key(mut self, key: impl Into<String>) -> Self {
        self.pipe_key = key.into();
        self
    }

    /// Register or override a pipe; caller entries win on name collision.
    pub fn with_pipe<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: for<'a> Fn(PipeInput<'a>) -> PipeResult<'a> + Send + Sync + 'static,
    {
        self.pipes.insert(name.into(), Arc::new(func) as PipeFn);
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("select_key", &self.select_key)
            .field("pipe_key", &self.pipe_key)
            .field("pipes", &self.pipes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A mapped value together with the document positions its parts were found
/// at. Lives only while an array template reorders its entries.
struct ResultEntry {
    value: Value,
    position: HashMap<String, usize>,
}

/// Map a template over raw HTML.
///
/// The document is parsed once. An array template yields the ordered array
/// of values; an object template yields the first matched element's result,
/// or `Null` when nothing matched; any other template value yields `Null`.
pub async fn map(html: &str, template: &Value, opts: &Options) -> Result<Value, MapError> {
    let document = Html::parse_document(html);
    let scope = Scope::root(&document);
    map_scope(&scope, template, opts).await
}

/// Same as [`map`], with the template supplied as JSON text, decoded once.
pub async fn map_str(html: &str, template_json: &str, opts: &Options) -> Result<Value, MapError> {
    let template: Value = serde_json::from_str(template_json)?;
    map(html, &template, opts).await
}

/// Map a template over an already-acquired scope: the entry used by nested
/// templates, and by callers embedding the engine mid-document.
pub fn map_scope<'a>(
    scope: &'a Scope<'a>,
    template: &'a Value,
    opts: &'a Options,
) -> LocalBoxFuture<'a, Result<Value, MapError>> {
    Box::pin(async move {
        match template {
            Value::Array(items) => map_array(scope, items, opts).await.map(Value::Array),
            Value::Object(fields) => {
                let mut results = map_object(scope, fields, opts).await?;
                if results.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(results.swap_remove(0).value)
                }
            }
            _ => Ok(Value::Null),
        }
    })
}

/// Resolve an object template: one result object per matched element, fields
/// built in template order, reserved keys consumed rather than emitted, the
/// object-level pipe chain applied last.
fn map_object<'a>(
    scope: &'a Scope<'a>,
    template: &'a Map<String, Value>,
    opts: &'a Options,
) -> LocalBoxFuture<'a, Result<Vec<ResultEntry>, MapError>> {
    Box::pin(async move {
        let scope_selector = template
            .get(&opts.select_key)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let sub_scope = scope.resolve(scope_selector, &opts.select_key)?;
        tracing::debug!(
            selector = scope_selector,
            matches = sub_scope.len(),
            "object template scope resolved"
        );

        let mut results = Vec::new();
        for element in sub_scope.elements() {
            let element_scope = Scope::from_element(*element);
            let mut fields = Map::new();
            let mut position = HashMap::new();

            for (key, template_value) in template {
                if key == &opts.select_key {
                    // the match's own position orders this result in arrays
                    position.insert(
                        opts.select_key.clone(),
                        element_scope.position().unwrap_or(0),
                    );
                    continue;
                }
                if key == &opts.pipe_key {
                    continue;
                }
                match template_value {
                    Value::Object(_) | Value::Array(_) => {
                        // selectors inside are relative to this element
                        let nested = map_scope(&element_scope, template_value, opts).await?;
                        fields.insert(key.clone(), nested);
                    }
                    leaf => {
                        let (value, pos) = eval_leaf(leaf, &element_scope, opts).await?;
                        position.insert(key.clone(), pos.unwrap_or(0));
                        fields.insert(key.clone(), value);
                    }
                }
            }

            let value = match template.get(&opts.pipe_key) {
                Some(declared) => {
                    let specs = parse_pipes(declared, &opts.pipe_key);
                    apply_pipes(&specs, Value::Object(fields), None, &element_scope, opts).await?
                }
                None => Value::Object(fields),
            };

            results.push(ResultEntry { value, position });
        }

        Ok(results)
    })
}

/// Resolve an array template: object elements fan out over their matches,
/// leaf elements evaluate once against the current scope, then everything is
/// stably sorted back into document order.
async fn map_array(
    scope: &Scope<'_>,
    items: &[Value],
    opts: &Options,
) -> Result<Vec<Value>, MapError> {
    let mut entries: Vec<ResultEntry> = Vec::new();

    for item in items {
        match item {
            Value::Object(fields) => {
                entries.extend(map_object(scope, fields, opts).await?);
            }
            Value::Array(_) => {
                // a nested array evaluates once and joins at the front
                let value = map_scope(scope, item, opts).await?;
                entries.push(ResultEntry {
                    value,
                    position: HashMap::new(),
                });
            }
            leaf => {
                let (value, pos) = eval_leaf(leaf, scope, opts).await?;
                let mut position = HashMap::new();
                position.insert(SYNTHETIC_KEY.to_string(), pos.unwrap_or(0));
                entries.push(ResultEntry { value, position });
            }
        }
    }

    // stable: ties keep encounter order
    entries.sort_by_key(|entry| {
        entry
            .position
            .get(&opts.select_key)
            .or_else(|| entry.position.get(SYNTHETIC_KEY))
            .copied()
            .unwrap_or(0)
    });

    Ok(entries.into_iter().map(|entry| entry.value).collect())
}

/// Resolve one leaf template value to its value and document position.
async fn eval_leaf(
    leaf: &Value,
    scope: &Scope<'_>,
    opts: &Options,
) -> Result<(Value, Option<usize>), MapError> {
    let text = match leaf {
        Value::String(s) => s,
        // raw primitives pass through unchanged
        other => return Ok((other.clone(), None)),
    };

    if let Some(inner) = quoted_literal(text) {
        return Ok((Value::String(inner.to_string()), None));
    }

    let mut parts = text.split(opts.pipe_key.as_str());
    let selector = parts.next().unwrap_or_default();
    let mut specs = vec![PipeSpec::text()];
    for entry in parts {
        specs.extend(parse_pipe_entry(entry));
    }

    let value = apply_pipes(&specs, Value::Null, Some(selector), scope, opts).await?;
    let position = leaf_position(scope, selector, opts)?;
    Ok((value, position))
}

/// Leaves wholly wrapped in a matching pair of quotes are literals; the
/// grammar is not applied to them.
fn quoted_literal(text: &str) -> Option<&str> {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
}

fn leaf_position(
    scope: &Scope<'_>,
    selector: &str,
    opts: &Options,
) -> Result<Option<usize>, MapError> {
    let trimmed = selector.trim();
    if trimmed.is_empty() || trimmed == opts.select_key {
        return Ok(None);
    }
    Ok(scope.resolve(trimmed, &opts.select_key)?.position())
}
