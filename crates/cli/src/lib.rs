pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "issuebot",
    about = "IssueBot operator CLI",
    long_about = "Inspect configuration, check backend readiness, and resolve issue codes \
                  against the configured store without going through Slack.",
    after_help = "Examples:\n  issuebot doctor --json\n  issuebot config\n  issuebot resolve vpn\n  issuebot list"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and probe the configured issue backend")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Resolve one issue code and print the canned response")]
    Resolve {
        #[arg(help = "Issue code, letters and digits only")]
        code: String,
    },
    #[command(about = "Print the synthesized `list` text (tabular backends only)")]
    List,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Resolve { code } => commands::resolve::run(&code),
        Command::List => commands::resolve::run_list(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
