//! Pattern compilation.

use regex::{Regex, RegexBuilder};

use crate::config::{PatternSpec, RoutingError, RoutingResult};

/// A compiled routing pattern.
#[derive(Debug, Clone)]
pub(crate) struct CompiledPattern {
    pub(crate) source: String,
    pub(crate) regex: Regex,
    pub(crate) weight: f64,
    pub(crate) language: String,
    pub(crate) capability: Option<String>,
}

/// Splits `/body/flags` into its parts; other patterns have no flags.
fn split_delimited(pattern: &str) -> (&str, &str) {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let flags = &rest[end + 1..];
            if flags.chars().all(|c| c.is_ascii_alphabetic()) {
                return (&rest[..end], flags);
            }
        }
    }
    (pattern, "")
}

pub(crate) fn compile(
    tool: &str,
    spec: &PatternSpec,
    case_sensitive: bool,
) -> RoutingResult<CompiledPattern> {
    let invalid = |reason: String| RoutingError::InvalidPattern {
        tool: tool.to_owned(),
        pattern: spec.pattern.clone(),
        reason,
    };

    let (body, flags) = split_delimited(&spec.pattern);
    let mut builder = RegexBuilder::new(body);
    builder.case_insensitive(!case_sensitive);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'u' => builder.unicode(true),
            other => return Err(invalid(format!("unsupported flag `{other}`"))),
        };
    }
    let regex = builder.build().map_err(|err| invalid(err.to_string()))?;

    Ok(CompiledPattern {
        source: spec.pattern.clone(),
        regex,
        weight: spec.weight,
        language: spec.language.clone(),
        capability: spec.capability.clone(),
    })
}
