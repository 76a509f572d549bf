use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use extrepo::cache::{CheckoutPaths, GitCli};
use extrepo::process::resolve_executable;
use extrepo::{CheckoutResolver, ConnectionDetails, ErrorKind};

#[derive(Parser)]
#[command(
    name = "extrepo",
    about = "Check out external repositories at a given ref into a local cache"
)]
struct Cli {
    /// Directory under which checkouts are cached
    #[arg(long, global = true, env = "EXTREPO_CACHE_ROOT")]
    cache_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check out a repository at a reference and print the checkout path
    Resolve {
        /// Repository, e.g. owner/name
        repository: String,

        /// Branch, tag or commit
        reference: String,

        /// Base URL of the hosting service
        #[arg(long, env = "EXTREPO_BASE_URL", default_value = "https://github.com")]
        base_url: String,

        /// Token used to authenticate the clone
        #[arg(long, env = "EXTREPO_TOKEN", hide_env_values = true, default_value = "")]
        token: String,

        /// Seconds to wait for another resolver working on the same checkout
        #[arg(long, env = "EXTREPO_LOCK_TIMEOUT_SECS", default_value_t = 300)]
        lock_timeout_secs: u64,
    },

    /// Check dependencies
    Doctor,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let paths = match cli.cache_root {
        Some(root) => CheckoutPaths::new(root),
        None => Ok(CheckoutPaths::default()),
    };
    let paths = match paths {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("Error: invalid cache root: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Resolve {
            repository,
            reference,
            base_url,
            token,
            lock_timeout_secs,
        } => cmd_resolve(
            &paths,
            &repository,
            &reference,
            &base_url,
            token,
            Duration::from_secs(lock_timeout_secs),
        ),
        Commands::Doctor => cmd_doctor(&paths),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let invalid_input = e
            .downcast_ref::<extrepo::CheckoutError>()
            .is_some_and(|e| e.kind() == ErrorKind::InvalidInput);
        if invalid_input {
            eprintln!();
            eprintln!("Hint: check the repository and reference arguments");
        }
        std::process::exit(1);
    }
}

fn cmd_resolve(
    paths: &CheckoutPaths,
    repository: &str,
    reference: &str,
    base_url: &str,
    token: String,
    lock_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let connection = ConnectionDetails::parse(base_url, token)?;
    let resolver = CheckoutResolver::new(paths.root())?.with_lock_timeout(lock_timeout);

    let path = resolver.resolve(repository, reference, &connection)?;
    println!("{}", path.display());

    Ok(())
}

fn cmd_doctor(paths: &CheckoutPaths) -> Result<(), Box<dyn std::error::Error>> {
    println!("extrepo System Check\n");

    // Check git
    let git_path = resolve_executable("git");
    println!(
        "[{}] git executable: {}",
        if git_path.is_ok() { "OK" } else { "FAIL" },
        match &git_path {
            Ok(path) => path.display().to_string(),
            Err(e) => e.to_string(),
        }
    );

    let git_version = GitCli::new().version();
    let git_ok = git_path.is_ok() && git_version.is_ok();
    println!(
        "[{}] git version: {}",
        if git_version.is_ok() { "OK" } else { "FAIL" },
        match &git_version {
            Ok(version) => version.clone(),
            Err(e) => e.to_string(),
        }
    );

    // Check cache directory
    let cache_ok = paths.root().is_dir();
    println!(
        "[{}] Cache root: {}{}",
        if cache_ok { "OK" } else { "INFO" },
        paths.root().display(),
        if cache_ok { "" } else { " (created on first checkout)" }
    );

    if !git_ok {
        std::process::exit(1);
    }

    Ok(())
}
