use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use spaghettifs::fsck::fsck;
use spaghettifs::migrations::upgrade;
use spaghettifs::Session;

/// A POSIX filesystem stored as history in a bare Git repository.
#[derive(Parser)]
#[command(name = "spaghettifs", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize an empty filesystem repository
    Mkfs {
        /// Directory for the new repository
        repo: PathBuf,
    },
    /// Mount a filesystem repository
    Mount {
        /// The repository directory
        repo: PathBuf,
        /// The mount point
        mountpoint: PathBuf,
    },
    /// Check a repository for consistency issues
    Fsck {
        /// The repository directory
        repo: PathBuf,
    },
    /// Run storage format migrations
    Upgrade {
        /// The repository directory
        repo: PathBuf,
    },
}

/// Set up the logging / tracing system for the application.
fn configure_tracing(cli: &Cli) -> Result<()> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    // Level according to the `-q`/`--quiet` and `-v`/`--verbose` options
    let level_filter = if cli.quiet {
        LevelFilter::ERROR
    } else if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    // SPAGHETTIFS_LOG overrides with a full filter expression
    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("SPAGHETTIFS_LOG")
        .from_env()
        .context("Failed to parse filters from SPAGHETTIFS_LOG environment variable")?;

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn try_main(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Mkfs { repo } => {
            Session::create(repo)
                .with_context(|| format!("Failed to create repository at {}", repo.display()))?;
            println!("created filesystem repository at {}", repo.display());
            Ok(())
        }

        Command::Mount { repo, mountpoint } => {
            // Validate the repository before reporting the missing driver
            Session::open(repo, false)
                .with_context(|| format!("Failed to open repository at {}", repo.display()))?;
            // The kernel shim is a separate concern driving
            // spaghettifs::MountedFs; this binary carries none.
            bail!(
                "no FUSE driver is built into this binary; cannot mount {} at {}",
                repo.display(),
                mountpoint.display()
            );
        }

        Command::Fsck { repo } => {
            let mut stdout = std::io::stdout();
            let errors = fsck(repo, &mut stdout)
                .with_context(|| format!("Failed to check repository at {}", repo.display()))?;
            if errors > 0 {
                bail!("{} consistency errors found", errors);
            }
            Ok(())
        }

        Command::Upgrade { repo } => {
            let applied = upgrade(repo)
                .with_context(|| format!("Failed to upgrade repository at {}", repo.display()))?;
            println!("{} migrations applied", applied);
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = configure_tracing(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(2);
    }
    if let Err(e) = try_main(&cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(2);
    }
}
