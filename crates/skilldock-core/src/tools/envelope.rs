//! The uniform response envelope and its builders.
//!
//! Every operation crossing the outward boundary returns a [`ToolResponse`];
//! no typed error ever escapes. Success builders compute `bytes` and
//! `sha256` from the chosen content representation, and binary content is
//! base64-encoded.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SkilldockError};
use crate::model::{ExecutionResult, SkillDescriptor};
use crate::util::sha256_hex;

/// Type tag of a successful (or failed) envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Metadata,
    Instructions,
    Reference,
    Asset,
    ExecutionResult,
    SearchResults,
    Error,
}

/// Uniform outward response shape for every tool operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(rename = "type")]
    pub response_type: ResponseType,
    pub skill: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
}

impl ToolResponse {
    fn success(response_type: ResponseType, skill: &str, content: Value) -> Self {
        Self {
            ok: true,
            response_type,
            skill: skill.to_string(),
            path: None,
            content,
            bytes: None,
            sha256: None,
            truncated: false,
            meta: Map::new(),
        }
    }
}

/// Catalog listing (`skills.list`).
pub fn metadata_response(skill: &str, descriptors: &[SkillDescriptor]) -> ToolResponse {
    let content = serde_json::to_value(descriptors).unwrap_or(Value::Array(Vec::new()));
    let mut response = ToolResponse::success(ResponseType::Metadata, skill, content);
    response
        .meta
        .insert("count".to_string(), Value::from(descriptors.len()));
    response
}

/// SKILL.md body (`skills.activate`).
pub fn instructions_response(skill: &str, instructions: &str, path: &str) -> ToolResponse {
    let raw = instructions.as_bytes();
    let mut response = ToolResponse::success(
        ResponseType::Instructions,
        skill,
        Value::String(instructions.to_string()),
    );
    response.path = Some(path.to_string());
    response.bytes = Some(raw.len() as u64);
    response.sha256 = Some(sha256_hex(raw));
    response
}

/// Text file contents (`skills.read` on a text extension).
pub fn reference_response(skill: &str, path: &str, content: &str, truncated: bool) -> ToolResponse {
    let raw = content.as_bytes();
    let mut response = ToolResponse::success(
        ResponseType::Reference,
        skill,
        Value::String(content.to_string()),
    );
    response.path = Some(path.to_string());
    response.bytes = Some(raw.len() as u64);
    response.sha256 = Some(sha256_hex(raw));
    response.truncated = truncated;
    response
}

/// Binary file contents, base64-encoded (`skills.read` on a binary asset).
///
/// `bytes` and `sha256` describe the raw bytes, not their base64 encoding.
pub fn asset_response(skill: &str, path: &str, content: &[u8]) -> ToolResponse {
    let mut response = ToolResponse::success(
        ResponseType::Asset,
        skill,
        Value::String(BASE64.encode(content)),
    );
    response.path = Some(path.to_string());
    response.bytes = Some(content.len() as u64);
    response.sha256 = Some(sha256_hex(content));
    response
        .meta
        .insert("encoding".to_string(), Value::String("base64".to_string()));
    response
}

/// Script outcome (`skills.run`). Timeouts are successes at this layer.
pub fn execution_response(skill: &str, path: &str, result: &ExecutionResult) -> ToolResponse {
    let content = serde_json::to_value(result).unwrap_or(Value::Null);
    let mut response = ToolResponse::success(ResponseType::ExecutionResult, skill, content);
    response.path = Some(path.to_string());
    response.meta = result.meta.clone();
    response
}

/// Search hits (`skills.search`).
pub fn search_response(skill: &str, query: &str, results: Vec<Value>) -> ToolResponse {
    let count = results.len();
    let mut response =
        ToolResponse::success(ResponseType::SearchResults, skill, Value::Array(results));
    response
        .meta
        .insert("query".to_string(), Value::String(query.to_string()));
    response.meta.insert("result_count".to_string(), Value::from(count));
    response
}

/// Map a typed error onto the uniform error envelope.
pub fn error_response(skill: &str, error: &SkilldockError, path: Option<&str>) -> ToolResponse {
    let mut meta = Map::new();
    meta.insert(
        "error_type".to_string(),
        Value::String(error.class_name().to_string()),
    );
    meta.insert(
        "kind".to_string(),
        Value::String(error.kind().as_str().to_string()),
    );

    ToolResponse {
        ok: false,
        response_type: ResponseType::Error,
        skill: skill.to_string(),
        path: path.map(str::to_string),
        content: Value::String(format!("{}: {error}", error.class_name())),
        bytes: None,
        sha256: None,
        truncated: false,
        meta,
    }
}

/// Run an operation and guarantee that no error escapes the boundary.
pub fn safe_call(
    skill: &str,
    path: Option<&str>,
    operation: impl FnOnce() -> Result<ToolResponse>,
) -> ToolResponse {
    match operation() {
        Ok(response) => response,
        Err(error) => error_response(skill, &error, path),
    }
}
