//! glidecloud CLI - runs the live tracking server.

mod error;

use std::path::PathBuf;

use clap::Parser;
use glidecloud::config::ConfigFile;
use glidecloud::logging::init_logging;
use glidecloud::persist::Database;
use glidecloud::server::{ServerConfig, ServerRuntime};
use tokio_util::sync::CancellationToken;

use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "glidecloud")]
#[command(version = glidecloud::VERSION)]
#[command(about = "Live tracking server for glider pilots", long_about = None)]
struct Args {
    /// State snapshot file, created on first save
    database: PathBuf,

    /// INI configuration file (defaults apply if missing)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        e.exit();
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::default(),
    };

    let _logging_guard =
        init_logging(config.logging.file.as_deref(), args.verbose).map_err(CliError::LoggingInit)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    runtime.block_on(serve(args.database, config))
}

async fn serve(database: PathBuf, config: ConfigFile) -> Result<(), CliError> {
    let server_config = ServerConfig {
        save_interval: config.save_interval(),
        ..ServerConfig::default()
    };

    let runtime = ServerRuntime::bind(
        config.bind_address(),
        server_config,
        Database::new(database),
        config.ogn_client_config(),
    )
    .await?;

    runtime.run(CancellationToken::new()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_database_is_required() {
        let err = Args::try_parse_from(["glidecloud"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_positional_database() {
        let args = Args::try_parse_from(["glidecloud", "/var/lib/glidecloud.db"]).unwrap();
        assert_eq!(args.database, PathBuf::from("/var/lib/glidecloud.db"));
        assert!(args.config.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_config_and_verbose() {
        let args =
            Args::try_parse_from(["glidecloud", "--config", "gc.ini", "-v", "state.db"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("gc.ini")));
        assert!(args.verbose);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = Args::try_parse_from(["glidecloud", "--bogus", "state.db"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_help_is_not_a_failure() {
        let err = Args::try_parse_from(["glidecloud", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn test_extra_positional_rejected() {
        assert!(Args::try_parse_from(["glidecloud", "a.db", "b.db"]).is_err());
    }
}
