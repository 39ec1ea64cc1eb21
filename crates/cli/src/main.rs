use std::process::ExitCode;

fn main() -> ExitCode {
    issuebot_cli::run()
}
