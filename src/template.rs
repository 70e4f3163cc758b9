//! `{{token}}` template resolution and result composition.
//!
//! Tokens never fail a request: anything unresolvable renders as an empty
//! string (logged at debug level). Resolution order per token:
//!
//! 1. `date:` prefix: remainder is a timestamp format pattern;
//! 2. whole expression made of date-grammar characters, treated as a
//!    timestamp pattern (a context field literally named `YYYY` is therefore
//!    unreachable; known quirk, kept);
//! 3. dotted-path lookup into the context;
//! 4. fixed alias table for derived/legacy names;
//! 5. empty string.

use chrono::{DateTime, Datelike, Local, Timelike};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{([^{}]*)\}\}").unwrap())
}

fn date_grammar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[YMDHms0-9\-:/ ]+$").unwrap())
}

/// Render every `{{token}}` in `template` against `ctx` at the current time.
pub fn render(template: &str, ctx: &Value) -> String {
    render_at(template, ctx, Local::now())
}

/// Render with an explicit timestamp (tests pin `now`).
pub fn render_at(template: &str, ctx: &Value, now: DateTime<Local>) -> String {
    token_re()
        .replace_all(template, |caps: &regex::Captures| {
            resolve_token(caps[1].trim(), ctx, &now)
        })
        .into_owned()
}

fn resolve_token(expr: &str, ctx: &Value, now: &DateTime<Local>) -> String {
    if let Some(pattern) = expr.strip_prefix("date:") {
        return format_timestamp(pattern.trim(), now);
    }
    if !expr.is_empty() && date_grammar_re().is_match(expr) {
        return format_timestamp(expr, now);
    }
    if let Some(value) = lookup_path(ctx, expr) {
        return value_to_string(value);
    }
    if let Some(derived) = resolve_alias(ctx, expr) {
        return derived;
    }
    debug!("template token '{{{{{}}}}}' did not resolve", expr);
    String::new()
}

/// Dotted-path traversal; every segment must exist as an own key.
fn lookup_path<'a>(ctx: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = ctx;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        // Arrays/objects have no sensible inline form.
        _ => String::new(),
    }
}

/// Derived and legacy names kept for template compatibility.
fn resolve_alias(ctx: &Value, expr: &str) -> Option<String> {
    match expr {
        "image.name" => {
            let filename = lookup_path(ctx, "image.filename")?.as_str()?;
            Some(match filename.rsplit_once('.') {
                Some((base, _ext)) if !base.is_empty() => base.to_string(),
                _ => filename.to_string(),
            })
        }
        "image.extension" => {
            let filename = lookup_path(ctx, "image.filename")?.as_str()?;
            Some(
                filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_string())
                    .unwrap_or_default(),
            )
        }
        "image.dimensions" => {
            let width = lookup_path(ctx, "image.width")?.as_u64()?;
            let height = lookup_path(ctx, "image.height")?.as_u64()?;
            Some(format!("{}x{}", width, height))
        }
        "provider.type" => Some(lookup_path(ctx, "provider.id")?.as_str()?.to_string()),
        _ => None,
    }
}

/// Expand a `Y M D H m s` pattern against a timestamp. Runs of the same
/// token letter collapse to one field (`YYYY` → 4-digit year, `YY` → 2-digit);
/// everything else passes through unchanged.
pub fn format_timestamp(pattern: &str, now: &DateTime<Local>) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let mut run = 1;
        while i + run < chars.len() && chars[i + run] == c {
            run += 1;
        }
        match c {
            'Y' => {
                if run >= 4 {
                    out.push_str(&format!("{:04}", now.year()));
                } else {
                    out.push_str(&format!("{:02}", now.year() % 100));
                }
            }
            'M' => out.push_str(&format!("{:02}", now.month())),
            'D' => out.push_str(&format!("{:02}", now.day())),
            'H' => out.push_str(&format!("{:02}", now.hour())),
            'm' => out.push_str(&format!("{:02}", now.minute())),
            's' => out.push_str(&format!("{:02}", now.second())),
            _ => {
                for _ in 0..run {
                    out.push(c);
                }
            }
        }
        i += run;
    }
    out
}

// ============================================================================
// Composition
// ============================================================================

/// The template set a request formats with.
#[derive(Debug, Clone, Default)]
pub struct FormatTemplates {
    pub header: String,
    pub footer: String,
    pub batch_header: String,
    pub batch_footer: String,
    pub item_header: String,
    pub item_footer: String,
}

/// `[header, body, footer]`, dropping segments that are empty after trim so
/// empty templates add no stray separators.
pub fn compose_single(templates: &FormatTemplates, ctx: &Value, body: &str) -> String {
    join_segments(&[
        render(&templates.header, ctx),
        body.to_string(),
        render(&templates.footer, ctx),
    ])
}

/// Per-image blocks `header+text+footer`, each rendered against an
/// image-scoped context. A block whose position has no matching image entry
/// (sentinel-count mismatch) renders with image tokens resolving empty.
pub fn compose_batch_items(
    templates: &FormatTemplates,
    ctx: &crate::context::OcrContext,
    texts: &[String],
) -> Vec<String> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let scoped = ctx.scoped_to(i).to_value();
            join_segments(&[
                render(&templates.item_header, &scoped),
                text.clone(),
                render(&templates.item_footer, &scoped),
            ])
        })
        .collect()
}

/// `[batchHeader, perImage(header+text+footer)..., batchFooter]`.
pub fn compose_batch(
    templates: &FormatTemplates,
    ctx: &crate::context::OcrContext,
    texts: &[String],
) -> String {
    let batch_value = ctx.to_value();
    let mut segments = vec![render(&templates.batch_header, &batch_value)];
    segments.extend(compose_batch_items(templates, ctx, texts));
    segments.push(render(&templates.batch_footer, &batch_value));
    join_segments(&segments)
}

fn join_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
