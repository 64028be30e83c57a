use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{ArgAction, Args, Parser, Subcommand};
use miette::{Context as _, IntoDiagnostic as _, Result};
use strata_fetch::{Coordinates, Fetcher};
use strata_model::RunDescriptor;
use strata_resolve::{ErrorKind, Workspace, load_universe};
use strata_solver::IndexSolver;
use tokio_util::sync::CancellationToken;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, prelude::*};
use url::Url;

const EXIT_UNRESOLVED: u8 = 1;
const EXIT_ENVIRONMENT: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser)]
#[command(name = "strata")]
#[command(version)]
#[command(about = "Resolve run descriptors into ordered, start-levelled run bundles")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv, -vvvv).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Resolve(ResolveArgs),
    Fetch(FetchArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Fail instead of rewriting the descriptor when the calculated run bundles differ.
    #[arg(long = "fail-on-changes")]
    fail_on_changes: bool,

    /// Recompute even when a cached result exists.
    #[arg(long = "force")]
    force: bool,

    /// Artifact cache directory (defaults to `.strata/cache` next to the descriptor).
    #[arg(long = "cache-dir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Run descriptor to resolve.
    #[arg(value_name = "RUN")]
    run: PathBuf,
}

#[derive(Args)]
struct FetchArgs {
    /// Expected SHA-256 of the artifact, hex encoded.
    #[arg(long = "checksum", value_name = "HEX")]
    checksum: Option<String>,

    /// Artifact cache directory (defaults to `.strata/cache` in the working directory).
    #[arg(long = "cache-dir", value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Artifact to fetch (URL or local path).
    #[arg(value_name = "URL")]
    url: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();
    let cli = Cli::parse();

    let result = match init_tracing(cli.verbose) {
        Ok(()) => match cli.command {
            Command::Resolve(args) => resolve(args).await,
            Command::Fetch(args) => fetch(args).await,
        },
        Err(err) => Err(err),
    };

    result.unwrap_or_else(|report| {
        eprintln!("{report:?}");
        ExitCode::from(EXIT_ENVIRONMENT)
    })
}

fn init_tracing(verbose: u8) -> Result<()> {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::try_from_default_env().into_diagnostic()?
    } else {
        let strata_level = match verbose {
            0 => "error",
            1 => "warn",
            2 => "info",
            3 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("error,strata={strata_level},strata_={strata_level}"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_fmt::layer().with_writer(std::io::stderr))
        .with(ErrorLayer::default())
        .init();

    Ok(())
}

async fn resolve(args: ResolveArgs) -> Result<ExitCode> {
    let path = args.run.canonicalize().map_err(|e| {
        miette::miette!("failed to resolve run descriptor `{}`: {}", args.run.display(), e)
    })?;
    let base = Url::from_file_path(&path)
        .map_err(|_| miette::miette!("could not convert `{}` into a file URL", path.display()))?;
    let mut descriptor = RunDescriptor::load(&path)
        .wrap_err_with(|| format!("failed to load run descriptor `{}`", path.display()))?;

    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => default_cache_dir(path.parent().unwrap_or(Path::new("."))),
    };
    let fetcher = Fetcher::new(cache_dir);
    let cancel = cancel_on_ctrl_c();
    let workspace = Workspace::new(Arc::new(IndexSolver::new()));

    let outcome = match load_universe(&descriptor.spec, &base, &fetcher).await {
        Ok(universe) => {
            workspace
                .resolve(
                    &mut descriptor,
                    &universe,
                    args.fail_on_changes,
                    args.force,
                    &cancel,
                )
                .await
        }
        Err(err) => Err(err),
    };

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::Unresolved | ErrorKind::Drift => EXIT_UNRESOLVED,
                ErrorKind::Cancelled => EXIT_CANCELLED,
                _ => EXIT_ENVIRONMENT,
            };
            eprintln!("{:?}", miette::Report::new(err));
            return Ok(ExitCode::from(code));
        }
    };

    for bundle in report.bundles.iter() {
        println!("{bundle}");
    }
    if report.changed {
        descriptor
            .write_to(&path)
            .wrap_err_with(|| format!("failed to write run descriptor `{}`", path.display()))?;
        tracing::info!(path = %path.display(), "run bundles updated");
    }
    Ok(ExitCode::SUCCESS)
}

async fn fetch(args: FetchArgs) -> Result<ExitCode> {
    let url = parse_location(&args.url)?;
    let cache_dir = match args.cache_dir {
        Some(dir) => dir,
        None => default_cache_dir(&std::env::current_dir().into_diagnostic()?),
    };

    let mut coordinates = Coordinates::new(url);
    if let Some(checksum) = args.checksum {
        coordinates = coordinates.with_checksum(checksum);
    }
    let path = Fetcher::new(cache_dir)
        .fetch(&coordinates)
        .await
        .wrap_err_with(|| format!("failed to fetch `{coordinates}`"))?;
    println!("{}", path.display());
    Ok(ExitCode::SUCCESS)
}

fn default_cache_dir(dir: &Path) -> PathBuf {
    dir.join(".strata").join("cache")
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling resolution");
            token.cancel();
        }
    });
    cancel
}

fn parse_location(input: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(input) {
        let is_windows_drive_path = !input.contains("://")
            && url.scheme().len() == 1
            && input.as_bytes().get(1) == Some(&b':');
        if !is_windows_drive_path {
            return Ok(url);
        }
    }

    let path = Path::new(input);
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().into_diagnostic()?.join(path)
    };
    let abs = abs.canonicalize().map_err(|e| {
        miette::miette!("failed to resolve artifact path `{}`: {}", abs.display(), e)
    })?;
    Url::from_file_path(&abs)
        .map_err(|_| miette::miette!("could not convert `{}` into a file URL", abs.display()))
}
