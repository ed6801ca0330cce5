//! Test case descriptors
//!
//! Defines the data structures for deserializing the JSON test-case source
//! and validating it into immutable [`TestDescriptor`]s.
//!
//! The source file is a JSON array. Each entry is either an object or a bare
//! string; a bare string is shorthand for a test that only runs the script
//! and expects it to succeed.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::config::{timeout_from_secs, MAX_TIMEOUT_SECS};
use crate::common::{paths, Error, Result, Settings};

/// One test case entry as it appears in the JSON source
#[derive(Deserialize, Debug)]
struct RawDescriptor {
    /// Name of the test case
    name: Option<String>,
    /// Path to the script, relative to the project root
    #[serde(alias = "script")]
    script_path: Option<PathBuf>,
    /// Whether the script should exit 0 (default: true)
    expected_success: Option<bool>,
    /// Timeout in seconds
    #[serde(alias = "timeout_seconds")]
    timeout: Option<f64>,
    /// Substring that must appear in stdout
    expected_output: Option<String>,
    /// File whose full contents must equal stdout
    expected_result_file: Option<PathBuf>,
}

/// A validated test case
#[derive(Debug, Clone, PartialEq)]
pub struct TestDescriptor {
    /// 1-based position in the source file
    pub index: usize,
    /// Unique, non-empty name
    pub name: String,
    /// Script path, resolved against the project root
    pub script_path: PathBuf,
    /// Whether the script is expected to exit 0
    pub expected_success: bool,
    /// Time budget for one run
    pub timeout: Duration,
    /// Literal substring required in stdout
    pub expected_output: Option<String>,
    /// Reference file, resolved against the project root
    pub expected_result_file: Option<PathBuf>,
}

impl TestDescriptor {
    /// Create a descriptor that only checks for success
    pub fn new(name: impl Into<String>, script_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            index: 1,
            name: name.into(),
            script_path: script_path.into(),
            expected_success: true,
            timeout,
            expected_output: None,
            expected_result_file: None,
        }
    }
}

/// Load and validate the test-case file at `path`
pub fn load_descriptors(path: &Path, settings: &Settings) -> Result<Vec<TestDescriptor>> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;

    parse_descriptors(&content, settings).map_err(|e| match e {
        Error::Json(e) => Error::Config(format!(
            "Test case file '{}' contains invalid JSON: {}",
            path.display(),
            e
        )),
        other => other,
    })
}

/// Parse and validate test cases from JSON text
///
/// Errors name the offending entry and field. Nothing is executed here:
/// script and reference-file existence are only checked at run time.
pub fn parse_descriptors(json: &str, settings: &Settings) -> Result<Vec<TestDescriptor>> {
    let entries = match serde_json::from_str::<Value>(json)? {
        Value::Array(entries) => entries,
        _ => {
            return Err(Error::Config(
                "Test case file must contain a JSON array".to_string(),
            ))
        }
    };

    let mut descriptors = Vec::with_capacity(entries.len());
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (i, entry) in entries.into_iter().enumerate() {
        let index = i + 1;
        let descriptor = parse_entry(index, entry, settings)?;

        if let Some(&first) = seen.get(&descriptor.name) {
            return Err(Error::DuplicateName {
                name: descriptor.name,
                first,
                second: index,
            });
        }
        seen.insert(descriptor.name.clone(), index);
        descriptors.push(descriptor);
    }

    tracing::debug!(count = descriptors.len(), "Loaded test cases");
    Ok(descriptors)
}

fn parse_entry(index: usize, entry: Value, settings: &Settings) -> Result<TestDescriptor> {
    let raw = match entry {
        Value::String(script) => {
            let stem = Path::new(&script)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| script.clone());
            RawDescriptor {
                name: Some(format!("Test {}", stem)),
                script_path: Some(PathBuf::from(script)),
                expected_success: None,
                timeout: None,
                expected_output: None,
                expected_result_file: None,
            }
        }
        Value::Object(_) => {
            let name = entry.get("name").and_then(Value::as_str).map(str::to_string);
            let field = field_of(&entry);
            serde_json::from_value(entry).map_err(|e| {
                Error::invalid_descriptor(index, name.as_deref(), field, e.to_string())
            })?
        }
        other => {
            return Err(Error::invalid_descriptor(
                index,
                None,
                "<entry>",
                format!("expected an object or a script path string, got {}", other),
            ))
        }
    };

    let name = match raw.name {
        Some(name) if !name.trim().is_empty() => name,
        Some(_) => return Err(Error::invalid_descriptor(index, None, "name", "must not be empty")),
        None => return Err(Error::invalid_descriptor(index, None, "name", "missing required field")),
    };

    let script_path = match raw.script_path {
        Some(path) if !path.as_os_str().is_empty() => path,
        Some(_) => {
            return Err(Error::invalid_descriptor(
                index,
                Some(&name),
                "script_path",
                "must not be empty",
            ))
        }
        None => {
            return Err(Error::invalid_descriptor(
                index,
                Some(&name),
                "script_path",
                "missing required field",
            ))
        }
    };

    let timeout = match raw.timeout {
        Some(secs) => timeout_from_secs(secs).ok_or_else(|| {
            Error::invalid_descriptor(
                index,
                Some(&name),
                "timeout",
                format!(
                    "must be a positive number of at most {} seconds, got {}",
                    MAX_TIMEOUT_SECS, secs
                ),
            )
        })?,
        None => settings.default_timeout,
    };

    let root = &settings.project_root;
    Ok(TestDescriptor {
        index,
        script_path: paths::resolve(root, &script_path),
        expected_success: raw.expected_success.unwrap_or(true),
        timeout,
        expected_output: raw.expected_output.filter(|s| !s.is_empty()),
        expected_result_file: raw
            .expected_result_file
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| paths::resolve(root, &p)),
        name,
    })
}

/// Find the first field whose value has the wrong type
fn field_of(entry: &Value) -> &'static str {
    fn is<T: serde::de::DeserializeOwned>(entry: &Value, key: &str) -> bool {
        entry
            .get(key)
            .map_or(true, |v| serde_json::from_value::<Option<T>>(v.clone()).is_ok())
    }

    let checks: [(&'static str, bool); 8] = [
        ("name", is::<String>(entry, "name")),
        ("script_path", is::<PathBuf>(entry, "script_path")),
        ("script_path", is::<PathBuf>(entry, "script")),
        ("expected_success", is::<bool>(entry, "expected_success")),
        ("timeout", is::<f64>(entry, "timeout")),
        ("timeout", is::<f64>(entry, "timeout_seconds")),
        ("expected_output", is::<String>(entry, "expected_output")),
        ("expected_result_file", is::<PathBuf>(entry, "expected_result_file")),
    ];
    checks
        .iter()
        .find(|(_, ok)| !ok)
        .map(|(field, _)| *field)
        .unwrap_or("<entry>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::with_root(Path::new("/project"))
    }

    #[test]
    fn test_full_descriptor() {
        let descriptors = parse_descriptors(
            r#"[{
                "name": "math check",
                "script_path": "math.sh",
                "expected_success": true,
                "timeout": 5,
                "expected_output": "42",
                "expected_result_file": "resources/math.sh.log"
            }]"#,
            &settings(),
        )
        .unwrap();

        let d = &descriptors[0];
        assert_eq!(d.index, 1);
        assert_eq!(d.name, "math check");
        assert_eq!(d.script_path, PathBuf::from("/project/math.sh"));
        assert!(d.expected_success);
        assert_eq!(d.timeout, Duration::from_secs(5));
        assert_eq!(d.expected_output.as_deref(), Some("42"));
        assert_eq!(
            d.expected_result_file,
            Some(PathBuf::from("/project/resources/math.sh.log"))
        );
    }

    #[test]
    fn test_defaults_and_aliases() {
        let descriptors = parse_descriptors(
            r#"[
                {"name": "date ok", "script": "date.sh"},
                {"name": "hangs", "script_path": "/abs/sleep-60.sh", "timeout_seconds": 0.5, "extra": 1}
            ]"#,
            &settings(),
        )
        .unwrap();

        assert!(descriptors[0].expected_success);
        assert_eq!(descriptors[0].timeout, Duration::from_secs(30));
        assert!(descriptors[0].expected_output.is_none());
        assert_eq!(descriptors[1].script_path, PathBuf::from("/abs/sleep-60.sh"));
        assert_eq!(descriptors[1].timeout, Duration::from_millis(500));
        assert_eq!(descriptors[1].index, 2);
    }

    #[test]
    fn test_bare_string_entry() {
        let descriptors = parse_descriptors(r#"["scripts/date.sh"]"#, &settings()).unwrap();
        assert_eq!(descriptors[0].name, "Test date");
        assert_eq!(descriptors[0].script_path, PathBuf::from("/project/scripts/date.sh"));
        assert!(descriptors[0].expected_success);
    }

    #[test]
    fn test_empty_expectations_are_ignored() {
        let descriptors = parse_descriptors(
            r#"[{"name": "a", "script_path": "a.sh", "expected_output": "", "expected_result_file": ""}]"#,
            &settings(),
        )
        .unwrap();
        assert_eq!(descriptors[0].expected_output, None);
        assert_eq!(descriptors[0].expected_result_file, None);
    }

    #[test]
    fn test_missing_script_path_is_config_error() {
        let err = parse_descriptors(r#"[{"name": "no script"}]"#, &settings()).unwrap_err();
        match err {
            Error::InvalidDescriptor { index, name, field, .. } => {
                assert_eq!(index, 1);
                assert_eq!(name.as_deref(), Some("no script"));
                assert_eq!(field, "script_path");
            }
            other => panic!("Expected InvalidDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_or_empty_name_is_config_error() {
        let err = parse_descriptors(r#"[{"script_path": "a.sh"}]"#, &settings()).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { ref field, .. } if field == "name"));

        let err = parse_descriptors(r#"[{"name": " ", "script_path": "a.sh"}]"#, &settings())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_wrong_type_names_the_field() {
        let err = parse_descriptors(
            r#"[{"name": "t", "script_path": "a.sh", "expected_success": "yes"}]"#,
            &settings(),
        )
        .unwrap_err();
        match err {
            Error::InvalidDescriptor { field, name, .. } => {
                assert_eq!(field, "expected_success");
                assert_eq!(name.as_deref(), Some("t"));
            }
            other => panic!("Expected InvalidDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_timeout_is_config_error() {
        for timeout in ["0", "-3"] {
            let json = format!(r#"[{{"name": "t", "script_path": "a.sh", "timeout": {timeout}}}]"#);
            let err = parse_descriptors(&json, &settings()).unwrap_err();
            assert!(matches!(err, Error::InvalidDescriptor { ref field, .. } if field == "timeout"));
        }
    }

    #[test]
    fn test_huge_timeout_is_config_error() {
        let err = parse_descriptors(
            r#"[{"name": "big", "script_path": "ok.sh", "timeout": 1e19}]"#,
            &settings(),
        )
        .unwrap_err();
        match err {
            Error::InvalidDescriptor { field, name, .. } => {
                assert_eq!(field, "timeout");
                assert_eq!(name.as_deref(), Some("big"));
            }
            other => panic!("Expected InvalidDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = parse_descriptors(
            r#"[
                {"name": "same", "script_path": "a.sh"},
                {"name": "other", "script_path": "b.sh"},
                {"name": "same", "script_path": "c.sh"}
            ]"#,
            &settings(),
        )
        .unwrap_err();
        match err {
            Error::DuplicateName { name, first, second } => {
                assert_eq!(name, "same");
                assert_eq!(first, 1);
                assert_eq!(second, 3);
            }
            other => panic!("Expected DuplicateName, got {other:?}"),
        }
    }

    #[test]
    fn test_top_level_must_be_array() {
        let err = parse_descriptors(r#"{"name": "x"}"#, &settings()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = parse_descriptors("[1]", &settings()).unwrap_err();
        assert!(matches!(err, Error::InvalidDescriptor { index: 1, .. }));
    }

    #[test]
    fn test_load_reports_invalid_json_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Testcase.json");
        std::fs::write(&path, "[{").unwrap();
        let err = load_descriptors(&path, &settings()).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("invalid JSON")));

        let err = load_descriptors(&dir.path().join("missing.json"), &settings()).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
