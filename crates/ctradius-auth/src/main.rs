use clap::error::ErrorKind as ClapErrorKind;
use clap::Parser;
use ctradius_auth::{
    AppConfig, AuthError, AuthProvider, ChurchToolsClient, ModuleRegistry, Outcome, RadiusResponse,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ChurchTools RADIUS authorization
///
/// Prints RADIUS attribute lines for the given username on stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "ctradius-authorize")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Raw username as received by the RADIUS server
    #[arg(long)]
    username: String,

    /// Request route selecting the module chain
    #[arg(
        long = "request-route",
        alias = "requestRoute",
        default_value = "wifi",
        value_parser = ["wifi", "vpn"]
    )]
    request_route: String,

    /// Dotenv file with CT_SERVER_URL, CT_API_TOKEN and module secrets
    #[arg(long, value_name = "PATH")]
    env: Option<PathBuf>,

    /// Log file; stdout is reserved for RADIUS attributes
    #[arg(long, value_name = "PATH", default_value = "./authorize.log")]
    log: PathBuf,
}

fn init_logging(path: &Path) -> std::io::Result<WorkerGuard> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .init();

    Ok(guard)
}

async fn run(cli: &Cli) -> Result<RadiusResponse, AuthError> {
    let config = AppConfig::load(&cli.config, cli.env.as_deref())?;
    let client = Arc::new(ChurchToolsClient::new(&config.backend)?);

    let registry = ModuleRegistry::with_builtin_modules();
    let provider = AuthProvider::new(&config, &cli.request_route, &registry, client)?;

    provider.authorize(&cli.username).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion) => {
            e.print().ok();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            // The RADIUS server only understands attribute lines
            eprintln!("{}", e);
            println!("{}", RadiusResponse::Reject);
            return ExitCode::from(1);
        }
    };

    let _guard = match init_logging(&cli.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", cli.log.display(), e);
            println!("{}", RadiusResponse::Reject);
            return ExitCode::from(1);
        }
    };

    info!(
        username = %cli.username,
        route = %cli.request_route,
        config = %cli.config.display(),
        "Authorization request"
    );

    let outcome = Outcome::from_result(run(&cli).await);
    println!("{}", outcome.response);

    info!(exit_code = outcome.exit_code, "Authorization finished");
    ExitCode::from(outcome.exit_code)
}
