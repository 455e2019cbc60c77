use crate::demo::{run_demo, run_extract, run_score, DemoArgs, ExtractArgs, ScoreArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use visa_navigator::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Visa Navigator",
    about = "Run the student-visa assistant service or exercise its workflows from the command line",
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
    /// Score an application offline and print the strength report
    Score(ScoreArgs),
    /// Run text extraction on a local document
    Extract(ExtractArgs),
    /// Walk an applicant through the in-memory workflow end to end
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
        Command::Score(args) => run_score(args),
        Command::Extract(args) => run_extract(args),
        Command::Demo(args) => run_demo(args).await,
    }
}
