mod candidates;
mod config;
mod exec;
mod locator;
mod mutation;
mod orchestrator;
mod patch;
mod pipeline;
mod signature;
mod summary;
mod workspace;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;
use crate::signature::{analyze, synthesize, SignatureAnalysis};

#[derive(Parser)]
#[command(name = "funcmut")]
#[command(version)]
#[command(about = "Per-function build, test and mutation testing for C sources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, test and mutate every candidate function of the given programs
    Run {
        /// Programs (source file stems); defaults to the configured or discovered list
        programs: Vec<String>,

        /// Root of the C source tree
        #[arg(long)]
        source_root: Option<PathBuf>,

        /// Skip the mutation step
        #[arg(long)]
        no_mutation: bool,

        /// Patch the source tree in place instead of a temporary copy
        #[arg(long)]
        no_isolate: bool,
    },
    /// Inject a test wrapper for one function and print or save the result
    Wrap {
        file: PathBuf,
        signature: String,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Count functions in a results CSV whose mutation score exceeds a threshold
    Threshold { csv: PathBuf, threshold: f64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::default_config_path);
    let mut config = Config::load(cli.config.as_deref())?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        "Config path: {}",
        config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none, using defaults)".to_string())
    );

    match cli.command {
        Commands::Run {
            programs,
            source_root,
            no_mutation,
            no_isolate,
        } => {
            if let Some(root) = source_root {
                config.paths.source_root = root;
            }
            if no_mutation {
                config.mutation.enabled = false;
            }
            if no_isolate {
                config.paths.isolate = false;
            }

            let programs = orchestrator::resolve_programs(&config, &programs);
            if programs.is_empty() {
                anyhow::bail!(
                    "No programs given and no candidate files found under {}",
                    config
                        .paths
                        .source_root
                        .join(&config.paths.candidates_dir)
                        .display()
                );
            }
            tracing::info!("Running {} program(s): {}", programs.len(), programs.join(", "));

            let report = orchestrator::run_batch(&config, &programs).await?;
            for summary in &report.summaries {
                println!("{}", summary);
            }
            for (program, error) in &report.failures {
                println!("{}: failed: {}", program, error);
            }
            if !report.failures.is_empty() {
                anyhow::bail!("{} program(s) did not complete", report.failures.len());
            }
        }
        Commands::Wrap {
            file,
            signature,
            output,
        } => {
            let wrapped = wrap_file(&file, &signature, &config.commands.scope_keyword)?;
            match output {
                Some(path) => std::fs::write(&path, wrapped)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", wrapped),
            }
        }
        Commands::Threshold { csv, threshold } => {
            let count = summary::threshold::count_above(&csv, threshold)?;
            println!(
                "{} of {} scored functions have a mutation score above {} ({} rows)",
                count.above, count.scored, threshold, count.rows
            );
        }
    }

    Ok(())
}

/// Source of `file` with a wrapper for `signature` injected, if it needs one.
fn wrap_file(file: &Path, signature: &str, scope_keyword: &str) -> anyhow::Result<String> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let parsed = match analyze(signature, scope_keyword)? {
        SignatureAnalysis::NoWrapperNeeded => {
            tracing::info!("`{}` is not {}, no wrapper needed", signature, scope_keyword);
            return Ok(source);
        }
        SignatureAnalysis::Local(parsed) => parsed,
    };
    let wrapper = synthesize(&parsed).context("No wrapper synthesized")?;
    let wrapped = locator::inject_wrapper(&source, signature, &wrapper)
        .with_context(|| format!("Cannot inject wrapper into {}", file.display()))?;
    Ok(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_wrap_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gzread.c");
        std::fs::write(
            &file,
            "local int gz_avail(gz_statep state)\n{\n    return 0;\n}\n",
        )
        .unwrap();

        let wrapped = wrap_file(&file, "local int gz_avail(gz_statep state)", "local").unwrap();
        assert!(wrapped
            .contains("int test_gz_avail(gz_statep state) {\n    return gz_avail(state);\n}"));

        let unchanged = wrap_file(&file, "int ZEXPORT gzread(gzFile file)", "local").unwrap();
        assert_eq!(unchanged, std::fs::read_to_string(&file).unwrap());
    }

    #[test]
    fn test_wrap_file_missing_definition() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("gzread.c");
        std::fs::write(&file, "int x;\n").unwrap();
        assert!(wrap_file(&file, "local int gz_avail(gz_statep state)", "local").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli =
            Cli::try_parse_from(["funcmut", "run", "trees", "crc32", "--no-mutation"]).unwrap();
        match cli.command {
            Commands::Run {
                programs,
                no_mutation,
                no_isolate,
                ..
            } => {
                assert_eq!(programs, vec!["trees", "crc32"]);
                assert!(no_mutation);
                assert!(!no_isolate);
            }
            _ => panic!("expected run"),
        }
    }
}
