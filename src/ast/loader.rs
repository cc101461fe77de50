//! Loads a [`ParsedDocument`] from its already-parsed JSON form.
//!
//! The markup parser that turns an action-definition document into this
//! shape lives outside this crate. What this module owns
//! is the boundary: deserializing the JSON the parser collaborator hands us,
//! and failing loudly with a stable error code if that JSON doesn't match
//! the shape the compiler expects.

use std::path::Path;

use super::definitions::ParsedDocument;
use crate::error::{RunnerError, RunnerResult};

/// Parse a definition corpus from a JSON string.
pub fn load_str(json: &str) -> RunnerResult<ParsedDocument> {
    serde_json::from_str(json).map_err(RunnerError::from)
}

/// Parse a definition corpus from a JSON file on disk.
pub fn load_file(path: &Path) -> RunnerResult<ParsedDocument> {
    let content = std::fs::read_to_string(path)?;
    load_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_document_json() -> &'static str {
        r#"{
            "axes": {
                "mode": { "name": "mode", "values": ["dev", "prod"], "default": "dev" }
            },
            "arguments": {
                "name": {
                    "name": "name",
                    "value_type": "string",
                    "is_array": false,
                    "default": null,
                    "location": { "file_path": "actions.md", "line_number": 1, "section_name": "build" }
                }
            },
            "flags": {},
            "passthrough_env": ["PATH"],
            "actions": {
                "build": {
                    "name": "build",
                    "versions": [
                        {
                            "language": "bash",
                            "script": "echo ${args.name}",
                            "expansions": [{ "kind": "argument", "name": "name" }],
                            "returns": [],
                            "dependencies": [],
                            "conditions": [],
                            "location": { "file_path": "actions.md", "line_number": 2, "section_name": "build" }
                        }
                    ],
                    "required_env_vars": {},
                    "location": { "file_path": "actions.md", "line_number": 1, "section_name": "build" }
                }
            },
            "sequential_by_default": false
        }"#
    }

    #[test]
    fn loads_a_minimal_document() {
        let doc = load_str(minimal_document_json()).unwrap();
        assert!(doc.axes.contains_key("mode"));
        assert!(doc.actions.contains_key("build"));
        assert_eq!(doc.actions["build"].versions.len(), 1);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(load_str("{ not json").is_err());
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let result = load_file(Path::new("/nonexistent/path/actions.json"));
        assert!(matches!(result, Err(RunnerError::Io(_))));
    }
}
