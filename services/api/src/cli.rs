use crate::demo::{run_demo, run_roster_preview, DemoArgs, RosterArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use outreach::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Outreach Engine",
    about = "Run and exercise the outreach campaign delivery engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Parse a CSV lead roster and report what an import would enroll
    Roster(RosterArgs),
    /// Run an end-to-end demo: enroll leads, dispatch steps, and replay
    /// provider events
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Roster(args) => run_roster_preview(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
