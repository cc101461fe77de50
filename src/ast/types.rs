//! Primitive types shared across action definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Type of a declared return value or argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    String,
    Bool,
    File,
    Directory,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::String => "string",
            ValueType::Bool => "bool",
            ValueType::File => "file",
            ValueType::Directory => "directory",
        }
    }

    /// Whether this type names a filesystem path that must exist and match
    /// its kind (file vs. directory) after a successful action run.
    pub fn is_artifact(&self) -> bool {
        matches!(self, ValueType::File | ValueType::Directory)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int" => Ok(ValueType::Int),
            "string" => Ok(ValueType::String),
            "bool" => Ok(ValueType::Bool),
            "file" => Ok(ValueType::File),
            "directory" => Ok(ValueType::Directory),
            other => Err(format!(
                "invalid type '{other}', expected one of: int, string, bool, file, directory"
            )),
        }
    }
}

/// Normalized host platform, used by version conditions of the form `platform=value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Macos,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
        }
    }
}

/// A source location in the definition corpus, for error reporting. The
/// markup parser (out of scope) supplies these as already-parsed data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file_path: String,
    pub line_number: u32,
    pub section_name: String,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (in '{}')", self.file_path, self.line_number, self.section_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_round_trips_through_str() {
        for t in [
            ValueType::Int,
            ValueType::String,
            ValueType::Bool,
            ValueType::File,
            ValueType::Directory,
        ] {
            let parsed: ValueType = t.as_str().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn value_type_parse_is_case_insensitive() {
        assert_eq!("STRING".parse::<ValueType>().unwrap(), ValueType::String);
    }

    #[test]
    fn invalid_type_string_rejected() {
        assert!("enum".parse::<ValueType>().is_err());
    }

    #[test]
    fn only_file_and_directory_are_artifacts() {
        assert!(ValueType::File.is_artifact());
        assert!(ValueType::Directory.is_artifact());
        assert!(!ValueType::String.is_artifact());
        assert!(!ValueType::Int.is_artifact());
        assert!(!ValueType::Bool.is_artifact());
    }
}
