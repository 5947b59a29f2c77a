#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid build request: {message}")]
    InvalidRequest { message: String },
    #[error("build command failed to start ({command}): {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("build command could not be awaited ({command}): {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
