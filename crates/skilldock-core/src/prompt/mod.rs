//! Rendering the skill catalog for agent system prompts.

use std::str::FromStr;

use serde_json::{json, Value};

use crate::error::SkilldockError;
use crate::model::SkillDescriptor;

/// Supported catalog output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptFormat {
    ClaudeXml,
    Json,
}

impl FromStr for PromptFormat {
    type Err = SkilldockError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "claude_xml" => Ok(Self::ClaudeXml),
            "json" => Ok(Self::Json),
            other => Err(SkilldockError::InvalidArgument(format!(
                "unknown prompt format '{other}', expected 'claude_xml' or 'json'"
            ))),
        }
    }
}

fn escape_xml(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&apos;"),
            _ => output.push(ch),
        }
    }
    output
}

/// Render the catalog in the requested format.
pub fn render_catalog(
    skills: &[SkillDescriptor],
    format: PromptFormat,
    include_location: bool,
) -> String {
    match format {
        PromptFormat::ClaudeXml => render_claude_xml(skills, include_location),
        PromptFormat::Json => render_json(skills, include_location),
    }
}

/// Nested `<skill>` elements under one `<available_skills>` container.
fn render_claude_xml(skills: &[SkillDescriptor], include_location: bool) -> String {
    let mut output = String::from("<available_skills>\n");

    for skill in skills {
        output.push_str("  <skill name=\"");
        output.push_str(&escape_xml(&skill.name));
        output.push_str("\">\n");

        output.push_str("    <description>");
        output.push_str(&escape_xml(&skill.description));
        output.push_str("</description>\n");

        if include_location {
            output.push_str("    <path>");
            output.push_str(&escape_xml(&skill.path.to_string_lossy()));
            output.push_str("</path>\n");
        }

        if !skill.allowed_tools.is_empty() {
            output.push_str("    <allowed_tools>");
            output.push_str(&escape_xml(&skill.allowed_tools.join(", ")));
            output.push_str("</allowed_tools>\n");
        }

        output.push_str("  </skill>\n");
    }

    output.push_str("</available_skills>");
    output
}

/// A JSON array of compact descriptor objects.
fn render_json(skills: &[SkillDescriptor], include_location: bool) -> String {
    let entries: Vec<Value> = skills
        .iter()
        .map(|skill| {
            let mut entry = json!({
                "name": skill.name,
                "description": skill.description,
            });
            if include_location {
                entry["path"] = json!(skill.path.to_string_lossy());
            }
            if let Some(license) = &skill.license {
                entry["license"] = json!(license);
            }
            if !skill.allowed_tools.is_empty() {
                entry["allowed_tools"] = json!(skill.allowed_tools);
            }
            entry
        })
        .collect();

    serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::Map;
    use std::path::PathBuf;

    fn skill(name: &str, description: &str, tools: &[&str]) -> SkillDescriptor {
        SkillDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            path: PathBuf::from(format!("/skills/{name}")),
            license: None,
            compatibility: Map::new(),
            metadata: Map::new(),
            allowed_tools: tools.iter().map(|t| t.to_string()).collect(),
            hash: String::new(),
            mtime: Utc::now(),
        }
    }

    #[test]
    fn claude_xml_nests_description_path_and_tools() {
        let skills = vec![skill("demo", "A demo", &["bash"])];
        let xml = render_catalog(&skills, PromptFormat::ClaudeXml, true);
        assert!(xml.contains("<skill name=\"demo\">"));
        assert!(xml.contains("<description>A demo</description>"));
        assert!(xml.contains("<path>/skills/demo</path>"));
        assert!(xml.contains("<allowed_tools>bash</allowed_tools>"));
        assert!(xml.starts_with("<available_skills>"));
        assert!(xml.ends_with("</available_skills>"));
    }

    #[test]
    fn claude_xml_escapes_attribute_and_text_content() {
        let skills = vec![skill("a&b", "uses <tags> \"freely\"", &[])];
        let xml = render_catalog(&skills, PromptFormat::ClaudeXml, false);
        assert!(xml.contains("name=\"a&amp;b\""));
        assert!(xml.contains("&lt;tags&gt; &quot;freely&quot;"));
        assert!(!xml.contains("<path>"));
    }

    #[test]
    fn an_empty_catalog_renders_an_empty_container() {
        let xml = render_catalog(&[], PromptFormat::ClaudeXml, true);
        assert_eq!(xml, "<available_skills>\n</available_skills>");
    }

    #[test]
    fn json_renders_compact_descriptor_objects() {
        let skills = vec![skill("demo", "d", &[])];
        let rendered = render_catalog(&skills, PromptFormat::Json, true);
        let parsed: Vec<serde_json::Value> =
            serde_json::from_str(&rendered).expect("output should be valid JSON");
        assert_eq!(parsed[0]["name"], "demo");
        assert_eq!(parsed[0]["description"], "d");
        assert_eq!(parsed[0]["path"], "/skills/demo");
    }

    #[test]
    fn json_omits_location_when_asked() {
        let skills = vec![skill("demo", "d", &[])];
        let rendered = render_catalog(&skills, PromptFormat::Json, false);
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&rendered).expect("valid JSON");
        assert!(parsed[0].get("path").is_none());
    }

    #[test]
    fn format_parses_from_cli_strings() {
        assert_eq!("claude_xml".parse::<PromptFormat>().unwrap(), PromptFormat::ClaudeXml);
        assert_eq!("json".parse::<PromptFormat>().unwrap(), PromptFormat::Json);
        assert!("yaml".parse::<PromptFormat>().is_err());
    }
}
