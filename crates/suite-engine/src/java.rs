//! Java runtime check done before the engine is launched.

use regex::Regex;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::error::EngineError;

const VERSION_PATTERN: &str = r#"version "(.*?)""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaVersion {
    /// Quoted version string, e.g. `11.0.2` or `1.8.0_292`.
    pub raw: String,
    pub major: u32,
}

impl JavaVersion {
    /// Reads the first `version "..."` in `java -version` output.
    /// Legacy `1.x` versions report `x` as their major.
    pub fn parse(output: &str) -> Result<Option<JavaVersion>, EngineError> {
        let pattern = Regex::new(VERSION_PATTERN).map_err(|source| EngineError::Pattern {
            pattern: VERSION_PATTERN.to_string(),
            source,
        })?;
        let Some(raw) = pattern
            .captures(output)
            .and_then(|captures| captures.get(1))
            .map(|value| value.as_str().to_string())
        else {
            return Ok(None);
        };

        let mut parts = raw.split('.').map(leading_number);
        let major = match (parts.next().flatten(), parts.next().flatten()) {
            (Some(1), Some(legacy)) => Some(legacy),
            (Some(major), _) => Some(major),
            (None, _) => None,
        };
        Ok(major.map(|major| JavaVersion { raw, major }))
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Runs `<java> -version` and refuses runtimes newer than `max_major` or
/// whose version cannot be read.
pub fn check_java_version(java: &str, max_major: u32) -> Result<JavaVersion, EngineError> {
    let command = format!("{java} -version");
    let output = Command::new(java)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|source| EngineError::Spawn {
            command: command.clone(),
            source,
        })?;

    // The version banner goes to stderr on most runtimes.
    let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
    text.push('\n');
    text.push_str(&String::from_utf8_lossy(&output.stdout));

    match JavaVersion::parse(&text)? {
        Some(version) if version.major <= max_major => {
            debug!(java, version = %version.raw, "java version accepted");
            Ok(version)
        }
        found => {
            warn!(java, found = ?found.as_ref().map(|version| &version.raw), max_major, "incorrect java version");
            Err(EngineError::UnsupportedJava {
                java: java.to_string(),
                found: found.map(|version| version.raw),
                max_major,
            })
        }
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::check_java_version;
    use crate::error::EngineError;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn fake_java(dir: &Path, banner: &str) -> String {
        let path = dir.join("java");
        fs::write(&path, format!("#!/bin/sh\necho '{banner}' >&2\n")).expect("write fake java");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fake java");
        path.display().to_string()
    }

    #[test]
    fn supported_runtime_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let java = fake_java(dir.path(), "openjdk version \"11.0.2\" 2019-01-15");
        let version = check_java_version(&java, 11).expect("java 11 accepted");
        assert_eq!(version.major, 11);
    }

    #[test]
    fn newer_runtime_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let java = fake_java(dir.path(), "openjdk version \"17.0.2\" 2022-01-18");
        let err = check_java_version(&java, 11).expect_err("java 17 refused");
        assert!(matches!(
            &err,
            EngineError::UnsupportedJava { found: Some(found), max_major: 11, .. } if found == "17.0.2"
        ));
        assert!(err.to_string().starts_with("incorrect Java version"));
    }

    #[test]
    fn unreadable_banner_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let java = fake_java(dir.path(), "hello");
        let err = check_java_version(&java, 11).expect_err("no version refused");
        assert!(matches!(err, EngineError::UnsupportedJava { found: None, .. }));
    }

    #[test]
    fn missing_runtime_is_a_spawn_error() {
        let err = check_java_version("/definitely/not/a/java", 11).expect_err("missing java");
        assert!(matches!(err, EngineError::Spawn { .. }));
    }
}
