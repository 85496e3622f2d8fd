//! Per-function pipeline.
//!
//! Drives one candidate function through
//! `Init -> WrapperInjected -> Patched -> Built -> Tested -> [Mutated] -> Restored`.
//! A failed build or test short-circuits to restore. Restore runs on every
//! path that reached `Patched`, and a restore that cannot be verified is the
//! only outcome that escapes as an error.

use crate::candidates::FunctionCandidate;
use crate::config::{render_command, CommandVars, Config};
use crate::exec::{truncate_output, CommandResult, ExecutionContext};
use crate::locator::{inject_wrapper, LocateError};
use crate::mutation::{parse_report, MutationMetrics};
use crate::patch::{PatchError, PatchSession};
use crate::signature::{analyze, synthesize, SignatureAnalysis, SignatureError};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Pipeline steps that run a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Patch,
    Build,
    Test,
    Mutate,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::Patch => "patch",
            Step::Build => "build",
            Step::Test => "test",
            Step::Mutate => "mutate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    WrapperInjected,
    Patched,
    Built,
    Tested,
    Mutated,
    Failed(Step),
    Restored,
}

/// Why a function never reached the build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("no test source recorded for the function")]
    NoTestSource,
    #[error("test source {0} does not exist")]
    TestSourceMissing(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Locate(#[from] LocateError),
}

/// Errors that must stop the whole batch.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source tree integrity lost: {0}")]
    PatchIntegrity(#[source] PatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionStatus {
    Passed,
    BuildFailed,
    TestFailed,
    Skipped,
    Error,
}

impl FunctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionStatus::Passed => "passed",
            FunctionStatus::BuildFailed => "build_failed",
            FunctionStatus::TestFailed => "test_failed",
            FunctionStatus::Skipped => "skipped",
            FunctionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FunctionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResult {
    pub function_name: String,
    pub status: FunctionStatus,
    pub build_ok: bool,
    pub test_ok: bool,
    /// Some step hit its timeout
    pub timed_out: bool,
    pub failed_step: Option<Step>,
    /// Only present when the tests passed and the mutation step ran
    pub mutation: Option<MutationMetrics>,
    /// Truncated output of the failing step, or the error message
    pub diagnostics: String,
    pub duration_ms: u64,
}

impl FunctionResult {
    fn new(function_name: &str) -> Self {
        Self {
            function_name: function_name.to_string(),
            status: FunctionStatus::Passed,
            build_ok: false,
            test_ok: false,
            timed_out: false,
            failed_step: None,
            mutation: None,
            diagnostics: String::new(),
            duration_ms: 0,
        }
    }

    /// Result row for a function that was skipped before building.
    pub fn skipped(function_name: &str, reason: &SkipReason) -> Self {
        Self {
            status: FunctionStatus::Skipped,
            diagnostics: reason.to_string(),
            ..Self::new(function_name)
        }
    }

    fn settle_status(&mut self) {
        if self.status == FunctionStatus::Error {
            return;
        }
        self.status = if !self.build_ok {
            FunctionStatus::BuildFailed
        } else if !self.test_ok {
            FunctionStatus::TestFailed
        } else {
            FunctionStatus::Passed
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed(FunctionResult),
    Skipped {
        function_name: String,
        reason: SkipReason,
    },
}

impl PipelineOutcome {
    /// Flatten into the row that is recorded for the function.
    pub fn into_result(self) -> FunctionResult {
        match self {
            PipelineOutcome::Completed(result) => result,
            PipelineOutcome::Skipped {
                function_name,
                reason,
            } => FunctionResult::skipped(&function_name, &reason),
        }
    }
}

/// Everything the pipeline needs from the configuration for one program.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub program: String,
    pub scope_keyword: String,
    pub build_command: String,
    pub test_command: String,
    pub mutation_command: String,
    pub failure_marker: String,
    pub build_timeout: Duration,
    pub test_timeout: Duration,
    pub mutation_timeout: Duration,
    pub mutation_enabled: bool,
    pub max_output_bytes: usize,
    /// Host directory the generated test sources are expected in
    pub tests_dir: PathBuf,
    /// Host directory mutation reports are saved to
    pub reports_dir: PathBuf,
}

impl PipelineSettings {
    /// Settings for `program`, with directories resolved under `root`.
    pub fn from_config(config: &Config, program: &str, root: &Path) -> Self {
        Self {
            program: program.to_string(),
            scope_keyword: config.commands.scope_keyword.clone(),
            build_command: config.commands.build.clone(),
            test_command: config.commands.test.clone(),
            mutation_command: config.commands.mutation.clone(),
            failure_marker: config.commands.failure_marker.clone(),
            build_timeout: config.timeouts.build(),
            test_timeout: config.timeouts.test(),
            mutation_timeout: config.timeouts.mutation(),
            mutation_enabled: config.mutation.enabled,
            max_output_bytes: config.mutation.max_output_bytes,
            tests_dir: root.join(&config.paths.tests_dir),
            reports_dir: root.join(&config.paths.reports_dir),
        }
    }

    /// Where the mutation report of `function` is saved
    pub fn report_path(&self, function: &str) -> PathBuf {
        self.reports_dir
            .join(format!("mull_{}_{}.out", self.program, function))
    }

    /// Test output passes when the command succeeded and the marker is absent.
    fn tests_passed(&self, run: &CommandResult) -> bool {
        run.success()
            && (self.failure_marker.is_empty() || !run.stdout.contains(&self.failure_marker))
    }
}

/// Source content with a wrapper injected for locally scoped functions.
///
/// Externally linkable functions get the original content back unchanged.
pub fn prepare_source(
    original: &str,
    candidate: &FunctionCandidate,
    scope_keyword: &str,
) -> Result<String, SkipReason> {
    let parsed = match analyze(&candidate.signature, scope_keyword)? {
        SignatureAnalysis::NoWrapperNeeded => return Ok(original.to_string()),
        SignatureAnalysis::Local(parsed) => parsed,
    };
    let Some(wrapper) = synthesize(&parsed) else {
        return Ok(original.to_string());
    };
    Ok(inject_wrapper(original, &candidate.signature, &wrapper)?)
}

/// Run one candidate function against `source_path` inside `ctx`.
pub async fn run_function(
    ctx: &dyn ExecutionContext,
    settings: &PipelineSettings,
    source_path: &Path,
    candidate: &FunctionCandidate,
) -> Result<PipelineOutcome, PipelineError> {
    let started = Instant::now();
    let skip = |reason: SkipReason| {
        tracing::warn!("Skipping {}: {}", candidate.name, reason);
        Ok(PipelineOutcome::Skipped {
            function_name: candidate.name.clone(),
            reason,
        })
    };

    let Some(target) = candidate.test_target() else {
        return skip(SkipReason::NoTestSource);
    };
    if let Some(test_source) = candidate.test_source_name.as_deref() {
        if !settings.tests_dir.join(test_source).exists() {
            return skip(SkipReason::TestSourceMissing(test_source.to_string()));
        }
    }

    let mut result = FunctionResult::new(&candidate.name);

    let mut session = match PatchSession::open(source_path) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!("Cannot open {} for {}: {}", source_path.display(), candidate.name, e);
            result.status = FunctionStatus::Error;
            result.failed_step = Some(Step::Patch);
            result.diagnostics = e.to_string();
            result.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(PipelineOutcome::Completed(result));
        }
    };

    let patched = match prepare_source(session.original(), candidate, &settings.scope_keyword) {
        Ok(patched) => patched,
        Err(reason) => return skip(reason),
    };

    let mut run = Run {
        ctx,
        settings,
        target,
        function: &candidate.name,
        state: PipelineState::Init,
    };
    run.advance(PipelineState::WrapperInjected);

    if let Err(e) = run.drive(&mut session, &patched, &mut result).await {
        let step = run.current_step();
        tracing::warn!("{} failed during {}: {:#}", candidate.name, step, e);
        result.status = FunctionStatus::Error;
        result.failed_step = Some(step);
        result.diagnostics = truncate_output(&format!("{:#}", e), settings.max_output_bytes);
        run.advance(PipelineState::Failed(step));
    }

    session.restore().map_err(|e| {
        tracing::error!("CRITICAL: {} may be left patched: {}", session.path().display(), e);
        PipelineError::PatchIntegrity(e)
    })?;
    run.advance(PipelineState::Restored);

    result.settle_status();
    result.duration_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        "Function {} ({}): build={} test={} mutation={} ({}ms)",
        candidate.name,
        result.status,
        result.build_ok,
        result.test_ok,
        result
            .mutation
            .as_ref()
            .map(|m| m.score.to_string())
            .unwrap_or_else(|| "-".to_string()),
        result.duration_ms
    );

    Ok(PipelineOutcome::Completed(result))
}

/// State of one function's run through the steps.
struct Run<'a> {
    ctx: &'a dyn ExecutionContext,
    settings: &'a PipelineSettings,
    target: &'a str,
    function: &'a str,
    state: PipelineState,
}

impl Run<'_> {
    fn advance(&mut self, next: PipelineState) {
        tracing::debug!("{}: {:?} -> {:?}", self.function, self.state, next);
        self.state = next;
    }

    /// The step being attempted from the current state.
    fn current_step(&self) -> Step {
        match self.state {
            PipelineState::Init | PipelineState::WrapperInjected => Step::Patch,
            PipelineState::Patched => Step::Build,
            PipelineState::Built => Step::Test,
            PipelineState::Tested | PipelineState::Mutated | PipelineState::Restored => {
                Step::Mutate
            }
            PipelineState::Failed(step) => step,
        }
    }

    fn command(&self, template: &str) -> String {
        render_command(
            template,
            CommandVars {
                target: self.target,
                program: &self.settings.program,
                function: self.function,
            },
        )
    }

    fn fail(&mut self, step: Step, run: &CommandResult, result: &mut FunctionResult) {
        result.failed_step = Some(step);
        result.timed_out |= run.timed_out;
        result.diagnostics =
            truncate_output(&run.combined_output(), self.settings.max_output_bytes);
        self.advance(PipelineState::Failed(step));
    }

    /// Patch, build, test and mutate. `Err` means a step could not run at all.
    async fn drive(
        &mut self,
        session: &mut PatchSession,
        patched: &str,
        result: &mut FunctionResult,
    ) -> anyhow::Result<()> {
        session.stage(patched)?;
        self.advance(PipelineState::Patched);

        let build = self
            .ctx
            .exec(&self.command(&self.settings.build_command), self.settings.build_timeout)
            .await?;
        tracing::debug!("Build of {} took {}ms", self.target, build.duration_ms);
        if !build.success() {
            tracing::warn!("Build failed for {} (exit {})", self.function, build.exit_code);
            self.fail(Step::Build, &build, result);
            return Ok(());
        }
        result.build_ok = true;
        self.advance(PipelineState::Built);

        let test = self
            .ctx
            .exec(&self.command(&self.settings.test_command), self.settings.test_timeout)
            .await?;
        tracing::debug!("Tests of {} took {}ms", self.target, test.duration_ms);
        if !self.settings.tests_passed(&test) {
            tracing::warn!("Tests failed for {} (exit {})", self.function, test.exit_code);
            self.fail(Step::Test, &test, result);
            return Ok(());
        }
        result.test_ok = true;
        self.advance(PipelineState::Tested);

        if !self.settings.mutation_enabled {
            return Ok(());
        }

        let mutation = self
            .ctx
            .exec(
                &self.command(&self.settings.mutation_command),
                self.settings.mutation_timeout,
            )
            .await?;
        let output = mutation.combined_output();
        if mutation.timed_out {
            tracing::warn!("Mutation run timed out for {}", self.function);
            result.timed_out = true;
        }

        let report_path = self.settings.report_path(self.function);
        tokio::fs::create_dir_all(&self.settings.reports_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.settings.reports_dir.display()))?;
        tokio::fs::write(&report_path, &output)
            .await
            .with_context(|| format!("Failed to save report to {}", report_path.display()))?;

        let mut metrics = parse_report(&output);
        metrics.raw_output_ref = Some(report_path);
        result.mutation = Some(metrics);
        self.advance(PipelineState::Mutated);

        Ok(())
    }
}
