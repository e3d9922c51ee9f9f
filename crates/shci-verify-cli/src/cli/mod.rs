mod commands;

use clap::Parser;
use shci_verify_core::HarnessError;

pub fn run_from_env() -> i32 {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let harness_error = error.as_harness_error();
            eprintln!("{}", harness_error.diagnostic_line());
            harness_error.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(name = "shci-verify", about = "SHCI engine output verification harness")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run the scenario batch against the engine binary
    Run(commands::RunArgs),
    /// List the scenarios a manifest declares
    List(commands::ListArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_run_command(args),
        CliCommand::List(args) => commands::run_list_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Harness(HarnessError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_harness_error(&self) -> HarnessError {
        match self {
            Self::Usage(message) => {
                HarnessError::configuration("CONFIG.CLI_USAGE", message.clone())
            }
            Self::Harness(error) => error.clone(),
            Self::Internal(error) => HarnessError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
