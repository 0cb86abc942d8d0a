//! Converts a legacy `AdapterConfig` document into the same task AST the
//! interpreter walks for a native Workflow document.
//!
//! Split into one submodule per phase, mirroring the legacy schema's own
//! four sections: [`params`], [`preconditions`], [`resources`], [`post`].
//! [`condition`] holds the condition-operator → jq mapping table shared by
//! the preconditions phase.

pub mod condition;
pub mod params;
pub mod post;
pub mod preconditions;
pub mod resources;

use crate::document::WorkflowDocument;
use crate::error::TranslateError;
use crate::result::Phase;
use serde::Deserialize;
use serde_json::Value;

/// Top-level legacy document: `{ apiVersion, kind, metadata, spec }`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: AdapterMetadata,
    pub spec: AdapterSpec,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdapterMetadata {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSpec {
    pub adapter: AdapterVersion,
    #[serde(default)]
    pub params: Vec<params::ParamDef>,
    #[serde(default)]
    pub preconditions: Vec<preconditions::PreconditionDef>,
    #[serde(default)]
    pub resources: Vec<resources::ResourceDef>,
    #[serde(default)]
    pub post: Option<post::PostSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AdapterVersion {
    pub version: String,
}

/// Translates a loaded `AdapterConfig` into a [`WorkflowDocument`].
///
/// Emits, in order: the params phase, the preconditions phase, the
/// resources phase (guarded on `allMatched` when preconditions exist), then
/// the post phase. Each phase function returns the `TaskItem`s it
/// contributes; this function's only job is to concatenate them and build
/// the document shell.
pub fn translate(cfg: &AdapterConfig) -> Result<WorkflowDocument, TranslateError> {
    let mut tasks = Vec::new();
    let mut phase_starts = Vec::new();

    if !cfg.spec.params.is_empty() {
        phase_starts.push((Phase::ParamExtraction, tasks.len()));
        tasks.extend(params::build(&cfg.spec.params));
    }

    let has_preconditions = !cfg.spec.preconditions.is_empty();
    if has_preconditions {
        phase_starts.push((Phase::Preconditions, tasks.len()));
        tasks.extend(preconditions::build(&cfg.spec.preconditions)?);
    }

    if !cfg.spec.resources.is_empty() {
        phase_starts.push((Phase::Resources, tasks.len()));
        tasks.push(resources::build(&cfg.spec.resources, has_preconditions));
    }

    if let Some(post) = &cfg.spec.post {
        phase_starts.push((Phase::Post, tasks.len()));
        tasks.push(post::build(post)?);
    }

    let mut tags = rustc_hash::FxHashMap::default();
    for (k, v) in &cfg.metadata.labels {
        tags.insert(k.clone(), v.clone());
    }

    Ok(WorkflowDocument {
        name: cfg.metadata.name.clone(),
        version: cfg.spec.adapter.version.clone(),
        namespace_label: cfg.metadata.namespace.clone(),
        tags,
        tasks,
        phase_starts,
    })
}

/// Converts mustache-style `{{ .path }}` placeholders embedded in a legacy
/// string field into this engine's `${ ... }` jq runtime-expression form. A
/// string consisting of exactly one placeholder becomes a direct value
/// reference (preserving the looked-up value's type); a placeholder
/// embedded in surrounding text becomes a jq string-interpolation
/// expression. A string with no placeholder at all is returned unchanged
/// (a literal, not an expression).
#[must_use]
pub fn mustache_to_jq(template: &str) -> Value {
    let placeholders = find_placeholders(template);
    if placeholders.is_empty() {
        return Value::String(template.to_string());
    }

    if placeholders.len() == 1 {
        let (start, end, path) = &placeholders[0];
        if *start == 0 && *end == template.len() {
            return Value::String(format!("${{ .{path} }}"));
        }
    }

    let mut out = String::from("${ \"");
    let mut cursor = 0;
    for (start, end, path) in &placeholders {
        out.push_str(&escape_jq_string_text(&template[cursor..*start]));
        out.push_str("\\(.");
        out.push_str(path);
        out.push(')');
        cursor = *end;
    }
    out.push_str(&escape_jq_string_text(&template[cursor..]));
    out.push_str("\" }");
    Value::String(out)
}

fn escape_jq_string_text(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Finds every `{{ .path }}` placeholder in `template`, returning
/// `(byte_start, byte_end, path)` triples in source order. `path` has the
/// leading `.` stripped (e.g. `params.clusterId`).
fn find_placeholders(template: &str) -> Vec<(usize, usize, String)> {
    let mut out = Vec::new();
    let mut rest = template;
    let mut offset = 0;
    while let Some(start) = rest.find("{{") {
        let Some(end_rel) = rest[start..].find("}}") else {
            break;
        };
        let end = start + end_rel + 2;
        let inner = rest[start + 2..end - 2].trim();
        if let Some(path) = inner.strip_prefix('.') {
            out.push((offset + start, offset + end, path.trim().to_string()));
        }
        rest = &rest[end..];
        offset += end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_placeholder_becomes_direct_value_reference() {
        assert_eq!(
            mustache_to_jq("{{ .name }}"),
            Value::String("${ .name }".to_string())
        );
    }

    #[test]
    fn mixed_string_becomes_interpolated_jq_string() {
        assert_eq!(
            mustache_to_jq("cluster-{{ .id }}-done"),
            Value::String("${ \"cluster-\\(.id)-done\" }".to_string())
        );
    }

    #[test]
    fn plain_string_without_placeholder_is_unchanged() {
        assert_eq!(
            mustache_to_jq("no placeholders here"),
            Value::String("no placeholders here".to_string())
        );
    }
}
