use suite_core::EngineConfig;

use crate::args::engine_arguments;
use crate::error::EngineError;
use crate::java::check_java_version;
use crate::types::{EngineCommand, EngineRequest};

const ALLOW_ATTACH_SELF: &str = "-Djdk.attach.allowAttachSelf=true";

/// Turns an engine request into a concrete process invocation.
pub trait EngineAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before every launch; an error aborts the launch.
    fn preflight(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn build_command(&self, request: &EngineRequest) -> EngineCommand;
}

/// Launches the engine jar with
/// `<java> -Djdk.attach.allowAttachSelf=true -jar <jar> <args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JarEngineAdapter {
    pub settings: EngineConfig,
}

impl JarEngineAdapter {
    pub fn new(settings: EngineConfig) -> Self {
        Self { settings }
    }
}

impl Default for JarEngineAdapter {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineAdapter for JarEngineAdapter {
    fn name(&self) -> &str {
        "jar"
    }

    fn preflight(&self) -> Result<(), EngineError> {
        if self.settings.check_java_version {
            check_java_version(&self.settings.java_path, self.settings.max_java_version)?;
        }
        Ok(())
    }

    fn build_command(&self, request: &EngineRequest) -> EngineCommand {
        let mut args = vec![
            ALLOW_ATTACH_SELF.to_string(),
            "-jar".to_string(),
            self.settings.jar_path.display().to_string(),
        ];
        args.extend(engine_arguments(request, &self.settings));
        EngineCommand {
            program: self.settings.java_path.clone(),
            args,
            env: Vec::new(),
        }
    }
}
