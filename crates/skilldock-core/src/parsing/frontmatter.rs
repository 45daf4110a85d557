//! Frontmatter extraction for SKILL.md files.
//!
//! A SKILL.md opens with a `---` line, carries a YAML mapping, and closes
//! with a second `---` line; everything after the closing line is the body.
//! A file with no opening delimiter is all body.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Result, SkilldockError};

/// Metadata fields and residual body split out of one SKILL.md.
#[derive(Debug, Clone)]
pub struct ParsedSkillFile {
    /// Frontmatter keys, verbatim, as JSON values.
    pub fields: Map<String, Value>,
    /// Everything after the closing delimiter, formatting preserved.
    pub body: String,
}

fn parse_error(path: &Path, message: impl Into<String>) -> SkilldockError {
    SkilldockError::SkillParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Split raw text into the frontmatter block and the body.
///
/// Returns `None` when there is no opening delimiter, `Some(Err(..))` when
/// the opening delimiter is never closed, and `Some(Ok((yaml, body)))`
/// otherwise. Offsets are byte-accurate so the body round-trips exactly.
fn split_frontmatter(text: &str) -> Option<std::result::Result<(&str, &str), ()>> {
    let first_line_end = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    if text[..first_line_end].trim_end() != "---" {
        return None;
    }

    let mut pos = first_line_end;
    let yaml_start = pos;
    while pos < text.len() {
        let line_end = text[pos..].find('\n').map(|i| pos + i + 1).unwrap_or(text.len());
        if text[pos..line_end].trim_end() == "---" {
            return Some(Ok((&text[yaml_start..pos], &text[line_end..])));
        }
        pos = line_end;
    }

    Some(Err(()))
}

/// Parse the text of a SKILL.md into metadata fields plus body.
///
/// `path` is only used for error reporting. Fails when the opening
/// delimiter is never closed, when the block is not a YAML mapping, or when
/// a present frontmatter block lacks a non-empty `name` or `description`.
pub fn parse_skill_text(path: &Path, text: &str) -> Result<ParsedSkillFile> {
    let (yaml_text, body) = match split_frontmatter(text) {
        None => {
            return Ok(ParsedSkillFile {
                fields: Map::new(),
                body: text.to_string(),
            });
        }
        Some(Err(())) => {
            return Err(parse_error(path, "frontmatter opened with '---' but never closed"));
        }
        Some(Ok(parts)) => parts,
    };

    let yaml: serde_yaml::Value = serde_yaml::from_str(yaml_text)
        .map_err(|error| parse_error(path, format!("invalid YAML in frontmatter: {error}")))?;

    let fields = match yaml {
        serde_yaml::Value::Null => Map::new(),
        other => {
            let value = serde_json::to_value(other).map_err(|error| {
                parse_error(path, format!("frontmatter is not JSON-representable: {error}"))
            })?;
            match value {
                Value::Object(map) => map,
                _ => return Err(parse_error(path, "frontmatter must be a YAML mapping")),
            }
        }
    };

    for key in ["name", "description"] {
        let present = fields
            .get(key)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            return Err(parse_error(
                path,
                format!("frontmatter is missing required field: {key}"),
            ));
        }
    }

    Ok(ParsedSkillFile {
        fields,
        body: body.to_string(),
    })
}
