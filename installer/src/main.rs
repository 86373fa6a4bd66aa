//! `ga` installer CLI entrypoint.
//!
//! This binary installs the prebuilt `ga` executable for the running
//! platform, refusing anything whose digest does not match the release
//! table. Progress and diagnostics go to stderr; only `list` writes stdout.

use clap::Parser;
use ga_installer::cli::{Cli, Command, InstallArgs};
use ga_installer::config::{Settings, load_config};
use ga_installer::dirs::{BaseDirs, SystemBaseDirs};
use ga_installer::error::{InstallError, Result};
use ga_installer::install::InstallTarget;
use ga_installer::list::run_list;
use ga_installer::lock::InstallLock;
use ga_installer::output::{
    caveats_message, dry_run_message, is_directory_in_path, path_instructions,
    probe_warning_message, success_message, write_stderr_line,
};
use ga_installer::pipeline::{
    Cancellation, InstallOutcome, InstallRequest, PlatformRequest, locate_artifact, run_pipeline,
};
use ga_installer::release::table::ReleaseTable;
use std::io::Write;
use tracing_subscriber::EnvFilter;

/// Everything loaded before the pipeline starts.
struct Prepared {
    table: ReleaseTable,
    settings: Settings,
    target: InstallTarget,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity());

    let mut stderr = std::io::stderr();
    let dirs = SystemBaseDirs;
    let exit_code = match &cli.command {
        Some(Command::List(args)) => {
            let mut stdout = std::io::stdout();
            exit_code_for_run_result(
                run_list(args, &dirs, &mut stdout).map(|()| 0),
                &mut stderr,
            )
        }
        _ => exit_code_for_run_result(run(cli.install_args(), &dirs, &mut stderr), &mut stderr),
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Route `log` records to stderr; `RUST_LOG` overrides `-v`.
fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .try_init();
}

fn log_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn run(args: &InstallArgs, dirs: &dyn BaseDirs, stderr: &mut dyn Write) -> Result<i32> {
    let prepared = prepare(args, dirs)?;
    let request = install_request(args, &prepared);

    if args.dry_run {
        let artifact = locate_artifact(&request).map_err(|failure| failure.error)?;
        write_stderr_line(
            stderr,
            dry_run_message(&artifact, &prepared.target.final_path()),
        );
        return Ok(0);
    }

    let install_dir = &prepared.target.install_dir;
    std::fs::create_dir_all(install_dir).map_err(|source| InstallError::Filesystem {
        path: install_dir.clone().into_std_path_buf(),
        source,
    })?;
    let _lock = InstallLock::acquire(install_dir)?;

    let outcome = run_pipeline(&request, &Cancellation::new(), stderr);
    report_outcome(&outcome, &prepared, args.quiet, stderr);
    Ok(outcome.exit_code())
}

/// Load configuration and the release table, and fix the install target.
fn prepare(args: &InstallArgs, dirs: &dyn BaseDirs) -> Result<Prepared> {
    let config = load_config(args.config.as_deref(), dirs)?;
    let settings = Settings::resolve(args, &config, dirs)?;
    let table = match &settings.release_table {
        Some(path) => ReleaseTable::load(path)?,
        None => ReleaseTable::bundled()?,
    };
    let binary_name = settings
        .binary_name
        .clone()
        .unwrap_or_else(|| table.package().name.clone());
    let target = InstallTarget::new(binary_name, settings.install_dir.clone())?;
    Ok(Prepared {
        table,
        settings,
        target,
    })
}

fn install_request<'a>(args: &'a InstallArgs, prepared: &'a Prepared) -> InstallRequest<'a> {
    InstallRequest {
        table: &prepared.table,
        version: args.release.as_ref(),
        platform: PlatformRequest::host().with_overrides(args.os, args.arch),
        target: prepared.target.clone(),
        timeout: prepared.settings.timeout,
        probe: !args.no_probe,
        quiet: args.quiet,
    }
}

fn report_outcome(
    outcome: &InstallOutcome,
    prepared: &Prepared,
    quiet: bool,
    stderr: &mut dyn Write,
) {
    let package = prepared.table.package();
    let (binary, artifact) = match outcome {
        InstallOutcome::Installed {
            binary, artifact, ..
        } => (binary, artifact),
        InstallOutcome::InstalledWithWarning {
            binary,
            artifact,
            warning,
        } => {
            write_stderr_line(stderr, probe_warning_message(binary, warning));
            (binary, artifact)
        }
        InstallOutcome::Failed(failure) => {
            write_stderr_line(stderr, format!("Error: {failure}"));
            if failure.error.is_retryable() {
                write_stderr_line(stderr, "This failure may be temporary; try again.");
            }
            return;
        }
    };

    write_stderr_line(
        stderr,
        success_message(&package.name, &artifact.version, binary),
    );
    if quiet {
        return;
    }
    if let Some(caveats) = caveats_message(package) {
        write_stderr_line(stderr, caveats);
    }
    let install_dir = &prepared.target.install_dir;
    if !is_directory_in_path(install_dir) {
        write_stderr_line(stderr, "");
        write_stderr_line(stderr, path_instructions(install_dir));
    }
}

fn exit_code_for_run_result(result: Result<i32>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            write_stderr_line(stderr, format!("Error: {err}"));
            err.exit_code()
        }
    }
}
