//! Program runs and batches.
//!
//! A program run owns one execution context for its whole duration:
//! start, setup commands, one pipeline per candidate (strictly sequential),
//! persistence, stop. Teardown, report copy-back and persistence are attempted
//! whatever happened in between.

use crate::candidates::{discover_programs, load_candidates, CandidateError, FunctionCandidate};
use crate::config::{render_command, CommandVars, Config};
use crate::exec::{truncate_output, ContainerContext, ExecError, ExecutionContext, LocalContext};
use crate::pipeline::{run_function, FunctionResult, PipelineError, PipelineSettings};
use crate::summary::{append_results, append_summary, RunSummary};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no candidates for {program}: {source}")]
    NoCandidates {
        program: String,
        #[source]
        source: CandidateError,
    },
    #[error("source file {} not found", .0.display())]
    MissingSource(PathBuf),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error("setup command `{command}` failed with exit code {exit_code}")]
    Setup { command: String, exit_code: i32 },
    #[error(transparent)]
    Integrity(#[from] PipelineError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunError {
    /// Errors after which no further program may be processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunError::Integrity(PipelineError::PatchIntegrity(e)) if e.is_integrity_failure()
        )
    }
}

/// Outcome of a batch over several programs.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub summaries: Vec<RunSummary>,
    /// `(program, error message)` of runs that did not complete
    pub failures: Vec<(String, String)>,
}

/// Execution context for a run rooted at `root`.
pub fn build_context(config: &Config, root: &Path) -> Box<dyn ExecutionContext> {
    if config.container.is_host() {
        Box::new(LocalContext::new(root))
    } else {
        Box::new(ContainerContext::new(
            &config.container,
            root,
            config.timeouts.start(),
        ))
    }
}

/// Run every candidate of `program` in a fresh workspace and context.
pub async fn run_program(config: &Config, program: &str) -> Result<RunSummary, RunError> {
    let workspace = Workspace::prepare(&config.paths.source_root, config.paths.isolate).await?;
    if workspace.is_isolated() {
        tracing::debug!("{} runs in {}", program, workspace.root().display());
    }
    let mut ctx = build_context(config, workspace.root());

    let result = drive_program(
        config,
        program,
        workspace.root(),
        workspace.original(),
        ctx.as_mut(),
    )
    .await;

    if let Err(e) = workspace.copy_back(&config.paths.reports_dir).await {
        tracing::warn!("Failed to copy mutation reports back: {:#}", e);
    }
    result
}

/// Run `program` inside an existing context.
///
/// `work_root` is where sources are patched and commands run; `output_root`
/// is where the CSV files are appended.
pub async fn drive_program(
    config: &Config,
    program: &str,
    work_root: &Path,
    output_root: &Path,
    ctx: &mut dyn ExecutionContext,
) -> Result<RunSummary, RunError> {
    let candidates = load_candidates(&config.candidates_file(work_root, program)).map_err(
        |source| RunError::NoCandidates {
            program: program.to_string(),
            source,
        },
    )?;
    let source_path = config.source_file(work_root, program);
    if !source_path.exists() {
        return Err(RunError::MissingSource(source_path));
    }

    tracing::info!(
        "Processing {} ({} candidate functions) in {}",
        program,
        candidates.len(),
        ctx.describe()
    );

    if ctx.is_running() {
        tracing::debug!("{} is already running", ctx.describe());
    } else if let Err(e) = ctx.start().await {
        tracing::error!("Failed to start {}: {}", ctx.describe(), e);
        ctx.stop().await;
        return Err(e.into());
    }

    let settings = PipelineSettings::from_config(config, program, work_root);
    let mut results = Vec::with_capacity(candidates.len());
    let outcome = run_candidates(
        config,
        &settings,
        &*ctx,
        &source_path,
        &candidates,
        &mut results,
    )
    .await;

    ctx.stop().await;

    let summary = RunSummary::from_results(program, &results);
    let persisted = if outcome.is_ok() || !results.is_empty() {
        persist(config, output_root, &summary, &results)
    } else {
        Ok(())
    };

    outcome?;
    persisted?;
    tracing::info!("{}", summary);
    Ok(summary)
}

async fn run_candidates(
    config: &Config,
    settings: &PipelineSettings,
    ctx: &dyn ExecutionContext,
    source_path: &Path,
    candidates: &[FunctionCandidate],
    results: &mut Vec<FunctionResult>,
) -> Result<(), RunError> {
    run_setup(config, &settings.program, ctx).await?;

    for (i, candidate) in candidates.iter().enumerate() {
        tracing::info!("[{}/{}] {}", i + 1, candidates.len(), candidate.name);
        let outcome = run_function(ctx, settings, source_path, candidate).await?;
        results.push(outcome.into_result());
    }
    Ok(())
}

/// Run the configured setup commands once.
async fn run_setup(
    config: &Config,
    program: &str,
    ctx: &dyn ExecutionContext,
) -> Result<(), RunError> {
    let vars = CommandVars {
        target: program,
        program,
        function: "",
    };
    for setup in &config.commands.setup {
        let command = render_command(&setup.command, vars);
        tracing::info!("Setup: {}", command);
        let result = ctx.exec(&command, config.timeouts.setup()).await?;
        if result.success() {
            continue;
        }

        let output = truncate_output(&result.combined_output(), config.mutation.max_output_bytes);
        if setup.required {
            tracing::error!("Setup command `{}` failed:\n{}", command, output);
            return Err(RunError::Setup {
                command,
                exit_code: result.exit_code,
            });
        }
        tracing::warn!("Optional setup command `{}` failed (exit {})", command, result.exit_code);
        tracing::debug!("{}", output);
    }
    Ok(())
}

fn persist(
    config: &Config,
    output_root: &Path,
    summary: &RunSummary,
    results: &[FunctionResult],
) -> Result<(), RunError> {
    let results_path = output_root.join(&config.paths.results_file);
    let summary_path = output_root.join(&config.paths.summary_file);

    append_results(&results_path, &summary.program, results)?;
    append_summary(&summary_path, summary)?;
    tracing::debug!(
        "Appended {} results to {} and summary to {}",
        results.len(),
        results_path.display(),
        summary_path.display()
    );
    Ok(())
}

/// Programs to process: those given, else the configured list, else every
/// program with a candidates file.
pub fn resolve_programs(config: &Config, requested: &[String]) -> Vec<String> {
    if !requested.is_empty() {
        return requested.to_vec();
    }
    if !config.batch.programs.is_empty() {
        return config.batch.programs.clone();
    }
    discover_programs(&config.paths.source_root.join(&config.paths.candidates_dir))
}

/// Run several programs one after another.
///
/// A failed program is recorded and the batch moves on; a patch-integrity
/// failure stops the batch.
pub async fn run_batch(config: &Config, programs: &[String]) -> Result<BatchReport, RunError> {
    let mut report = BatchReport::default();

    for program in programs {
        match run_program(config, program).await {
            Ok(summary) => report.summaries.push(summary),
            Err(e) if e.is_fatal() => {
                tracing::error!("Stopping batch at {}: {}", program, e);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!("Program {} failed: {}", program, e);
                report.failures.push((program.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        "Batch finished: {} programs completed, {} failed",
        report.summaries.len(),
        report.failures.len()
    );
    Ok(report)
}
