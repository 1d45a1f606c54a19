//! Built-in pipe functions
//!
//! The default registry every mapping call starts from. Absence of data is
//! `Value::Null` throughout; transforms pass it through so `default` can
//! react to it further down the chain.

use std::sync::Arc;

use chrono::SecondsFormat;
use serde_json::Value;

use super::{PipeFn, PipeInput, PipeRegistry, PipeResult};

/// Registry of the default pipes, merged under caller overrides per call.
pub fn default_registry() -> PipeRegistry {
    let mut pipes = PipeRegistry::new();
    register(&mut pipes, "text", text);
    register(&mut pipes, "trim", trim);
    register(&mut pipes, "lower", lower);
    register(&mut pipes, "upper", upper);
    register(&mut pipes, "substr", substr);
    register(&mut pipes, "default", default_value);
    register(&mut pipes, "parseAs", parse_as);
    register(&mut pipes, "attr", attr);
    register(&mut pipes, "log", log);
    pipes
}

fn register<F>(pipes: &mut PipeRegistry, name: &str, func: F)
where
    F: for<'a> Fn(PipeInput<'a>) -> PipeResult<'a> + Send + Sync + 'static,
{
    pipes.insert(name.to_string(), Arc::new(func) as PipeFn);
}

/// Trimmed text content of the selector match; absence on zero matches.
fn text(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        let resolved = input
            .scope
            .resolve(input.selector.unwrap_or_default(), &input.opts.select_key)?;
        Ok(resolved.text().map(Value::String).unwrap_or(Value::Null))
    })
}

fn trim(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move { Ok(map_text(input.value, |s| s.trim().to_string())) })
}

fn lower(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move { Ok(map_text(input.value, str::to_lowercase)) })
}

fn upper(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move { Ok(map_text(input.value, str::to_uppercase)) })
}

/// Substring by character bounds. Start defaults to 0; an omitted or zero end
/// means the end of the string. Bounds are clamped and swapped when reversed.
fn substr(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        if input.value.is_null() {
            return Ok(Value::Null);
        }
        let chars: Vec<char> = text_of(&input.value).chars().collect();
        let start = numeric_arg(input.args, 0);
        let end = match numeric_arg(input.args, 1) {
            0 => chars.len(),
            end => end,
        };
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let lo = lo.min(chars.len());
        let hi = hi.min(chars.len());
        Ok(Value::String(chars[lo..hi].iter().collect()))
    })
}

/// Current value when truthy, else the first arg.
fn default_value(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        if is_truthy(&input.value) {
            Ok(input.value)
        } else {
            Ok(input
                .args
                .first()
                .map(|arg| Value::String(arg.clone()))
                .unwrap_or(Value::Null))
        }
    })
}

/// Coerce the current value by kind: string, number, int (optional radix),
/// float, bool, date, json. `noop` and unrecognized kinds leave the value
/// untouched; failed coercions yield absence.
fn parse_as(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        let kind = input
            .args
            .first()
            .map(|k| k.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let text = match &input.value {
            Value::Null => String::new(),
            other => text_of(other),
        };
        let parsed = match kind.as_str() {
            "string" => Some(Value::String(text)),
            "number" => text.trim().parse::<f64>().ok().and_then(number_value),
            "int" => {
                let radix = input
                    .args
                    .get(1)
                    .and_then(|r| r.trim().parse::<u32>().ok())
                    .unwrap_or(10);
                parse_int_prefix(&text, radix)
            }
            "float" => parse_float_prefix(&text),
            "bool" => Some(Value::Bool(text.eq_ignore_ascii_case("true"))),
            "date" => parse_date(&text),
            "json" => serde_json::from_str(&text).ok(),
            _ => return Ok(input.value),
        };
        Ok(parsed.unwrap_or(Value::Null))
    })
}

/// Trimmed attribute value of the selector match; absence when nothing
/// matched or the attribute is unset.
fn attr(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        let name = input.args.first().map(String::as_str).unwrap_or_default();
        let resolved = input
            .scope
            .resolve(input.selector.unwrap_or_default(), &input.opts.select_key)?;
        Ok(resolved.attr(name).map(Value::String).unwrap_or(Value::Null))
    })
}

/// Diagnostic passthrough; emits the current value under an optional label.
fn log(input: PipeInput<'_>) -> PipeResult<'_> {
    Box::pin(async move {
        let label = input.args.first().map(String::as_str).unwrap_or("log");
        tracing::info!(label, value = %input.value, "pipe log");
        Ok(input.value)
    })
}

/// String transform that passes absence through untouched.
fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::String(f(&text_of(&other))),
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_arg(args: &[String], index: usize) -> usize {
    args.get(index)
        .and_then(|arg| arg.trim().parse::<usize>().ok())
        .unwrap_or(0)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Integral results encode as JSON integers so `123` round-trips as `123`,
/// not `123.0`.
fn number_value(number: f64) -> Option<Value> {
    if !number.is_finite() {
        return None;
    }
    if number.fract() == 0.0 && number.abs() <= i64::MAX as f64 {
        Some(Value::Number((number as i64).into()))
    } else {
        serde_json::Number::from_f64(number).map(Value::Number)
    }
}

/// Longest valid integer prefix in the given radix, `parseInt`-style:
/// `"42 items"` is 42, `"ff"` in radix 16 is 255.
fn parse_int_prefix(text: &str, radix: u32) -> Option<Value> {
    if !(2..=36).contains(&radix) {
        return None;
    }
    let t = text.trim();
    let (negative, t) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let t = if radix == 16 {
        t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")).unwrap_or(t)
    } else {
        t
    };
    let digits: String = t.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return None;
    }
    let magnitude = i64::from_str_radix(&digits, radix).ok()?;
    Some(Value::Number((if negative { -magnitude } else { magnitude }).into()))
}

/// Longest valid float prefix: `"3.14 approx"` is 3.14.
fn parse_float_prefix(text: &str) -> Option<Value> {
    let t = text.trim();
    for end in (1..=t.len()).rev() {
        if !t.is_char_boundary(end) {
            continue;
        }
        if let Some(value) = t[..end].parse::<f64>().ok().and_then(number_value) {
            return Some(value);
        }
    }
    None
}

/// Accepts RFC 3339/2822 and common date-time layouts; emits UTC ISO 8601
/// with millisecond precision.
fn parse_date(text: &str) -> Option<Value> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

    let t = text.trim();
    let parsed = DateTime::parse_from_rfc3339(t)
        .or_else(|_| DateTime::parse_from_rfc2822(t))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            [
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%dT%H:%M",
                "%Y-%m-%d %H:%M",
            ]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
            .map(|ndt| ndt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|ndt| ndt.and_utc())
        })?;

    Some(Value::String(
        parsed.to_rfc3339_opts(SecondsFormat::Millis, true),
    ))
}
