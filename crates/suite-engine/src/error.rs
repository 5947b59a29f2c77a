#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid engine request: {message}")]
    InvalidRequest { message: String },
    #[error("engine spawn failed ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine runtime error ({command}): {source}")]
    Runtime {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("incorrect Java version for {java}: found {}, need {max_major} or older", .found.as_deref().unwrap_or("none"))]
    UnsupportedJava {
        java: String,
        found: Option<String>,
        max_major: u32,
    },
    #[error("invalid progress pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::EngineError;
    use std::error::Error;

    #[test]
    fn invalid_request_error_formats_message() {
        let err = EngineError::InvalidRequest {
            message: "class_fqn must not be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid engine request: class_fqn must not be empty"
        );
    }

    #[test]
    fn spawn_error_keeps_command_and_source() {
        let err = EngineError::Spawn {
            command: "java -jar engine.jar".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "command not found"),
        };
        assert_eq!(
            err.to_string(),
            "engine spawn failed (java -jar engine.jar): command not found"
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn unsupported_java_names_found_and_required_versions() {
        let err = EngineError::UnsupportedJava {
            java: "java".to_string(),
            found: Some("17.0.2".to_string()),
            max_major: 11,
        };
        assert_eq!(
            err.to_string(),
            "incorrect Java version for java: found 17.0.2, need 11 or older"
        );
        let unknown = EngineError::UnsupportedJava {
            java: "java".to_string(),
            found: None,
            max_major: 11,
        };
        assert!(unknown.to_string().contains("found none"));
    }

    #[test]
    fn runtime_error_formats_message() {
        let err = EngineError::Runtime {
            command: "java".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "wait failed"),
        };
        assert_eq!(err.to_string(), "engine runtime error (java): wait failed");
    }
}
