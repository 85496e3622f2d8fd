use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where sources, candidates, tests and results live
    #[serde(default)]
    pub paths: PathsConfig,

    /// Isolated execution environment
    #[serde(default)]
    pub container: ContainerConfig,

    /// Build/test/mutation command templates
    #[serde(default)]
    pub commands: CommandsConfig,

    /// Per-step timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Mutation testing settings
    #[serde(default)]
    pub mutation: MutationSettings,

    /// Programs processed by a batch run
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the C source tree (mounted into the container)
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,

    /// Extension of program source files (`<program>.<ext>`)
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Directory (relative to source_root) holding `<program>_injectable_functions.json`
    #[serde(default = "default_candidates_dir")]
    pub candidates_dir: PathBuf,

    /// Directory (relative to source_root) holding generated test sources
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    /// Directory (relative to source_root) mutation reports are written to
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Append-only per-function results (CSV)
    #[serde(default = "default_results_file")]
    pub results_file: PathBuf,

    /// Append-only run summaries (CSV)
    #[serde(default = "default_summary_file")]
    pub summary_file: PathBuf,

    /// Work on a temporary copy of source_root instead of the tree itself
    #[serde(default = "default_true")]
    pub isolate: bool,
}

/// Container settings. `engine = "none"` runs commands on the host instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// `podman`, `docker`, or `none`
    #[serde(default = "default_engine")]
    pub engine: String,

    #[serde(default = "default_image")]
    pub image: String,

    /// Container name (one container per program run)
    #[serde(default = "default_container_name")]
    pub name: String,

    /// Mount point of source_root inside the container; also the working dir
    #[serde(default = "default_mount_point")]
    pub mount_point: String,

    #[serde(default = "default_user")]
    pub user: String,

    /// Shell used for `exec` (`<shell> -c <command>`)
    #[serde(default = "default_shell")]
    pub shell: String,
}

impl ContainerConfig {
    pub fn is_host(&self) -> bool {
        self.engine == "none"
    }
}

/// A command run once after the execution context starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupCommand {
    pub command: String,
    /// A failing required command aborts the program run
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Build command; `{target}`, `{program}` and `{function}` are substituted
    #[serde(default = "default_build_command")]
    pub build: String,

    /// Test command
    #[serde(default = "default_test_command")]
    pub test: String,

    /// Mutation testing command
    #[serde(default = "default_mutation_command")]
    pub mutation: String,

    /// Commands run once per program before any function
    #[serde(default)]
    pub setup: Vec<SetupCommand>,

    /// A test run whose stdout contains this is a failure even with exit code 0
    #[serde(default = "default_failure_marker")]
    pub failure_marker: String,

    /// Keyword marking file-local functions that need a wrapper
    #[serde(default = "default_scope_keyword")]
    pub scope_keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_start_timeout")]
    pub start_seconds: u64,
    #[serde(default = "default_setup_timeout")]
    pub setup_seconds: u64,
    #[serde(default = "default_build_timeout")]
    pub build_seconds: u64,
    #[serde(default = "default_test_timeout")]
    pub test_seconds: u64,
    #[serde(default = "default_mutation_timeout")]
    pub mutation_seconds: u64,
}

impl TimeoutsConfig {
    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_seconds)
    }

    pub fn setup(&self) -> Duration {
        Duration::from_secs(self.setup_seconds)
    }

    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_seconds)
    }

    pub fn test(&self) -> Duration {
        Duration::from_secs(self.test_seconds)
    }

    pub fn mutation(&self) -> Duration {
        Duration::from_secs(self.mutation_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationSettings {
    /// Run the mutation step for functions whose tests pass
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum captured output kept in diagnostics (bytes)
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Program names (source file stems); empty means discover from candidate files
    #[serde(default)]
    pub programs: Vec<String>,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_source_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_extension() -> String {
    "c".to_string()
}

fn default_candidates_dir() -> PathBuf {
    PathBuf::from("injectable_functions")
}

fn default_tests_dir() -> PathBuf {
    PathBuf::from("tests")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("mull-reports")
}

fn default_results_file() -> PathBuf {
    PathBuf::from("test_results_mull.csv")
}

fn default_summary_file() -> PathBuf {
    PathBuf::from("test_summary_mull.csv")
}

fn default_engine() -> String {
    "podman".to_string()
}

fn default_image() -> String {
    "build-zlib".to_string()
}

fn default_container_name() -> String {
    "build-zlib".to_string()
}

fn default_mount_point() -> String {
    "/zlib".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

fn default_shell() -> String {
    "bash".to_string()
}

fn default_build_command() -> String {
    "make {target}".to_string()
}

fn default_test_command() -> String {
    "./{target}".to_string()
}

fn default_mutation_command() -> String {
    "mull-runner-14 {target} --debug".to_string()
}

fn default_failure_marker() -> String {
    "FAIL".to_string()
}

fn default_scope_keyword() -> String {
    crate::signature::DEFAULT_SCOPE_KEYWORD.to_string()
}

fn default_start_timeout() -> u64 {
    120
}

fn default_setup_timeout() -> u64 {
    600 // configure with instrumentation is slow
}

fn default_build_timeout() -> u64 {
    300
}

fn default_test_timeout() -> u64 {
    120
}

fn default_mutation_timeout() -> u64 {
    600
}

fn default_max_output_bytes() -> usize {
    10_000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            source_extension: default_source_extension(),
            candidates_dir: default_candidates_dir(),
            tests_dir: default_tests_dir(),
            reports_dir: default_reports_dir(),
            results_file: default_results_file(),
            summary_file: default_summary_file(),
            isolate: true,
        }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            image: default_image(),
            name: default_container_name(),
            mount_point: default_mount_point(),
            user: default_user(),
            shell: default_shell(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            build: default_build_command(),
            test: default_test_command(),
            mutation: default_mutation_command(),
            setup: Vec::new(),
            failure_marker: default_failure_marker(),
            scope_keyword: default_scope_keyword(),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            start_seconds: default_start_timeout(),
            setup_seconds: default_setup_timeout(),
            build_seconds: default_build_timeout(),
            test_seconds: default_test_timeout(),
            mutation_seconds: default_mutation_timeout(),
        }
    }
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

/// Values substituted into command templates.
#[derive(Debug, Clone, Copy)]
pub struct CommandVars<'a> {
    pub target: &'a str,
    pub program: &'a str,
    pub function: &'a str,
}

/// Substitute `{target}`, `{program}` and `{function}` in a command template.
pub fn render_command(template: &str, vars: CommandVars<'_>) -> String {
    template
        .replace("{target}", vars.target)
        .replace("{program}", vars.program)
        .replace("{function}", vars.function)
}

impl Config {
    /// Load configuration from file, or use defaults if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(Self::default_config_path);

        let config = if let Some(ref path) = config_path {
            if path.exists() {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config from {:?}", path))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config from {:?}", path))?
            } else {
                Config::default()
            }
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "funcmut", "funcmut")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Source file of a program under `root` (the tree or its isolated copy)
    pub fn source_file(&self, root: &Path, program: &str) -> PathBuf {
        root.join(format!("{}.{}", program, self.paths.source_extension))
    }

    /// Candidate list of a program under `root`
    pub fn candidates_file(&self, root: &Path, program: &str) -> PathBuf {
        root.join(&self.paths.candidates_dir)
            .join(format!("{}_injectable_functions.json", program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Defaults
    // =========================================================================

    #[test]
    fn test_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.container.engine, "podman");
        assert_eq!(config.container.mount_point, "/zlib");
        assert_eq!(config.commands.build, "make {target}");
        assert_eq!(config.commands.failure_marker, "FAIL");
        assert_eq!(config.commands.scope_keyword, "local");
        assert_eq!(config.timeouts.build_seconds, 300);
        assert_eq!(config.timeouts.test_seconds, 120);
        assert_eq!(config.timeouts.mutation_seconds, 600);
        assert!(config.mutation.enabled);
        assert!(config.paths.isolate);
        assert!(config.batch.programs.is_empty());
    }

    #[test]
    fn test_timeouts_as_durations() {
        let timeouts = TimeoutsConfig::default();
        assert_eq!(timeouts.build(), Duration::from_secs(300));
        assert_eq!(timeouts.test(), Duration::from_secs(120));
        assert_eq!(timeouts.mutation(), Duration::from_secs(600));
        assert_eq!(timeouts.setup(), Duration::from_secs(600));
        assert_eq!(timeouts.start(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let toml_content = r#"
[container]
engine = "docker"

[commands]
test = "./{target} --verbose"

[[commands.setup]]
command = "make clean"
required = false

[[commands.setup]]
command = "./configure"
"#;
        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.container.engine, "docker");
        assert_eq!(config.container.image, "build-zlib");
        assert_eq!(config.commands.test, "./{target} --verbose");
        assert_eq!(config.commands.build, "make {target}");
        assert_eq!(config.commands.setup.len(), 2);
        assert!(!config.commands.setup[0].required);
        assert!(config.commands.setup[1].required);
    }

    #[test]
    fn test_host_engine() {
        let config = ContainerConfig {
            engine: "none".to_string(),
            ..Default::default()
        };
        assert!(config.is_host());
        assert!(!ContainerConfig::default().is_host());
    }

    // =========================================================================
    // Command templates
    // =========================================================================

    #[test]
    fn test_render_command() {
        let vars = CommandVars {
            target: "tests_trees_bi_reverse",
            program: "trees",
            function: "bi_reverse",
        };
        assert_eq!(
            render_command("make {target}", vars),
            "make tests_trees_bi_reverse"
        );
        assert_eq!(
            render_command(
                "mull-runner-14 {target} > mull-reports/mull_{program}_{function}.out",
                vars
            ),
            "mull-runner-14 tests_trees_bi_reverse > mull-reports/mull_trees_bi_reverse.out"
        );
        assert_eq!(render_command("make all", vars), "make all");
    }

    // =========================================================================
    // Paths
    // =========================================================================

    #[test]
    fn test_program_paths() {
        let config = Config::default();
        let root = Path::new("/work/zlib");
        assert_eq!(config.source_file(root, "trees"), PathBuf::from("/work/zlib/trees.c"));
        assert_eq!(
            config.candidates_file(root, "trees"),
            PathBuf::from("/work/zlib/injectable_functions/trees_injectable_functions.json")
        );
    }

    // =========================================================================
    // File I/O tests
    // =========================================================================

    #[test]
    fn test_config_load_nonexistent() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::remove_file(temp_file.path()).unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.container.engine, "podman");
    }

    #[test]
    fn test_config_load_valid_file() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();

        let toml_content = r#"
[general]
log_level = "debug"

[paths]
source_root = "/work/zlib"
isolate = false

[timeouts]
build_seconds = 60

[mutation]
enabled = false

[batch]
programs = ["trees", "crc32"]
"#;

        std::fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.paths.source_root, PathBuf::from("/work/zlib"));
        assert!(!config.paths.isolate);
        assert_eq!(config.timeouts.build_seconds, 60);
        assert_eq!(config.timeouts.test_seconds, 120);
        assert!(!config.mutation.enabled);
        assert_eq!(config.batch.programs, vec!["trees", "crc32"]);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();

        std::fs::write(temp_file.path(), "invalid {{{{ toml").unwrap();

        let result = Config::load(Some(temp_file.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().ends_with("config.toml"));
    }
}
