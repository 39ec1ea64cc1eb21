use issuebot_core::{ApplicationError, Resolution, ShortCode};
use issuebot_store::{connect_store, Resolver, StoreError};

use crate::commands::{prepare, CommandResult};

pub fn run(code: &str) -> CommandResult {
    let code = match ShortCode::parse_strict(code) {
        Ok(code) => code,
        Err(error) => {
            return CommandResult::failure("resolve", "invalid_code", error.to_string(), 7);
        }
    };

    let (config, runtime) = match prepare("resolve") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let store = connect_store(&config).await?;
        Resolver::new(store).resolve(code.raw()).await
    });

    match result {
        Ok(Resolution::Found(text)) => CommandResult::success("resolve", text),
        Ok(Resolution::NotFound) => CommandResult::failure(
            "resolve",
            "not_found",
            format!("no response configured for `{}`", code.raw()),
            6,
        ),
        Err(error) => store_failure("resolve", error),
    }
}

pub fn run_list() -> CommandResult {
    let (config, runtime) = match prepare("list") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let store = connect_store(&config).await?;
        Resolver::new(store).list().await
    });

    match result {
        Ok(listing) => CommandResult::success("list", listing),
        Err(error) => store_failure("list", error),
    }
}

fn store_failure(command: &str, error: StoreError) -> CommandResult {
    let message = error.to_string();
    let (error_class, exit_code) = match ApplicationError::from(error) {
        ApplicationError::Unsupported(_) => ("unsupported", 8),
        ApplicationError::Configuration(_) => ("config_validation", 2),
        ApplicationError::BackendUnavailable { .. } => ("backend_unavailable", 5),
        _ => ("integration", 5),
    };
    CommandResult::failure(command, error_class, message, exit_code)
}
