//! Configuration for the generation pipeline.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_root")]
    pub root: PathBuf,
    /// Classpath handed to the engine (`-projectCP`).
    #[serde(default = "default_classpath")]
    pub classpath: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_project_root(),
            classpath: default_classpath(),
        }
    }
}

/// Build step run before every engine invocation. An empty command skips it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default = "default_subprocess_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_subprocess_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_secs: default_subprocess_timeout_secs(),
            poll_interval_ms: default_subprocess_poll_ms(),
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchAlgorithm {
    RandomSearch,
    StandardGa,
    MonotonicGa,
    SteadyStateGa,
    BreederGa,
    CellularGa,
    StandardChemicalReaction,
    MapElites,
    OnePlusLambdaLambdaGa,
    OnePlusOneEa,
    MuPlusLambdaEa,
    MuLambdaEa,
    Mosa,
    #[default]
    Dynamosa,
    Lips,
    Mio,
    Nsgaii,
    Spea2,
}

impl SearchAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchAlgorithm::RandomSearch => "RANDOM_SEARCH",
            SearchAlgorithm::StandardGa => "STANDARD_GA",
            SearchAlgorithm::MonotonicGa => "MONOTONIC_GA",
            SearchAlgorithm::SteadyStateGa => "STEADY_STATE_GA",
            SearchAlgorithm::BreederGa => "BREEDER_GA",
            SearchAlgorithm::CellularGa => "CELLULAR_GA",
            SearchAlgorithm::StandardChemicalReaction => "STANDARD_CHEMICAL_REACTION",
            SearchAlgorithm::MapElites => "MAP_ELITES",
            SearchAlgorithm::OnePlusLambdaLambdaGa => "ONE_PLUS_LAMBDA_LAMBDA_GA",
            SearchAlgorithm::OnePlusOneEa => "ONE_PLUS_ONE_EA",
            SearchAlgorithm::MuPlusLambdaEa => "MU_PLUS_LAMBDA_EA",
            SearchAlgorithm::MuLambdaEa => "MU_LAMBDA_EA",
            SearchAlgorithm::Mosa => "MOSA",
            SearchAlgorithm::Dynamosa => "DYNAMOSA",
            SearchAlgorithm::Lips => "LIPS",
            SearchAlgorithm::Mio => "MIO",
            SearchAlgorithm::Nsgaii => "NSGAII",
            SearchAlgorithm::Spea2 => "SPEA2",
        }
    }

    /// Many-objective algorithms generate with `-generateMOSuite`.
    pub fn is_many_objective(&self) -> bool {
        matches!(
            self,
            SearchAlgorithm::Mosa
                | SearchAlgorithm::Dynamosa
                | SearchAlgorithm::Lips
                | SearchAlgorithm::Mio
        )
    }
}

impl std::fmt::Display for SearchAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coverage criteria the engine optimises for. All enabled by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaConfig {
    #[serde(default = "default_true")]
    pub line: bool,
    #[serde(default = "default_true")]
    pub branch: bool,
    #[serde(default = "default_true")]
    pub exception: bool,
    #[serde(default = "default_true")]
    pub weak_mutation: bool,
    #[serde(default = "default_true")]
    pub output: bool,
    #[serde(default = "default_true")]
    pub method: bool,
    #[serde(default = "default_true")]
    pub method_no_exception: bool,
    #[serde(default = "default_true")]
    pub cbranch: bool,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            line: true,
            branch: true,
            exception: true,
            weak_mutation: true,
            output: true,
            method: true,
            method_no_exception: true,
            cbranch: true,
        }
    }
}

impl CriteriaConfig {
    /// Engine names of the enabled criteria, in the engine's canonical order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        [
            (self.line, "LINE"),
            (self.branch, "BRANCH"),
            (self.exception, "EXCEPTION"),
            (self.weak_mutation, "WEAKMUTATION"),
            (self.output, "OUTPUT"),
            (self.method, "METHOD"),
            (self.method_no_exception, "METHODNOEXCEPTION"),
            (self.cbranch, "CBRANCH"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
        .collect()
    }

    pub fn none_enabled(&self) -> bool {
        self.enabled_names().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_java_path")]
    pub java_path: String,
    #[serde(default = "default_jar_path")]
    pub jar_path: PathBuf,
    #[serde(default = "default_subprocess_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_subprocess_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub algorithm: SearchAlgorithm,
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub configuration_id: Option<String>,
    #[serde(default = "default_true")]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub assertions: bool,
    #[serde(default)]
    pub junit_check: bool,
    #[serde(default = "default_true")]
    pub minimize: bool,
    #[serde(default)]
    pub criteria: CriteriaConfig,
    /// Run `<java> -version` before every launch.
    #[serde(default = "default_true")]
    pub check_java_version: bool,
    /// Newest Java major release the engine runs on.
    #[serde(default = "default_max_java_version")]
    pub max_java_version: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            java_path: default_java_path(),
            jar_path: default_jar_path(),
            timeout_secs: default_subprocess_timeout_secs(),
            poll_interval_ms: default_subprocess_poll_ms(),
            algorithm: SearchAlgorithm::default(),
            seed: None,
            configuration_id: None,
            sandbox: true,
            assertions: true,
            junit_check: false,
            minimize: true,
            criteria: CriteriaConfig::default(),
            check_java_version: true,
            max_java_version: default_max_java_version(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Where the engine writes `<job-id>` result files.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default = "default_watch_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_watch_ms")]
    pub max_watch_ms: u64,
    /// Drop the pending entry when no result shows up in time.
    #[serde(default)]
    pub prune_pending_on_timeout: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            results_dir: None,
            poll_interval_ms: default_watch_poll_ms(),
            max_watch_ms: default_max_watch_ms(),
            prune_pending_on_timeout: false,
        }
    }
}

impl WatcherConfig {
    pub fn resolved_results_dir(&self) -> PathBuf {
        self.results_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("suitegen-results"))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_watch(&self) -> Duration {
        Duration::from_millis(self.max_watch_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default = "default_true")]
    pub log: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            log: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// JSONL event log directory. Disabled when unset.
    #[serde(default)]
    pub event_log_root: Option<PathBuf>,
}

/// Cache and method snapshots kept between runs of the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_true")]
    pub persist: bool,
    /// Defaults to `<project.root>/.suitegen`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist: true,
            dir: None,
        }
    }
}

impl StateConfig {
    pub fn resolved_dir(&self, project_root: &Path) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| project_root.join(".suitegen"))
    }
}

fn default_true() -> bool {
    true
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_classpath() -> String {
    "target/classes".to_string()
}

fn default_subprocess_timeout_secs() -> u64 {
    12_000
}

fn default_subprocess_poll_ms() -> u64 {
    50
}

fn default_java_path() -> String {
    "java".to_string()
}

fn default_jar_path() -> PathBuf {
    PathBuf::from("lib/evosuite-1.0.4.jar")
}

fn default_max_java_version() -> u32 {
    11
}

fn default_watch_poll_ms() -> u64 {
    2_000
}

fn default_max_watch_ms() -> u64 {
    10_000
}

pub fn parse_config(contents: &str) -> Result<GeneratorConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<GeneratorConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_config(path: impl AsRef<Path>, config: &GeneratorConfig) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    let parent = path_ref
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf);
    if let Some(parent_dir) = parent {
        fs::create_dir_all(&parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir,
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}
