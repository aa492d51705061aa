mod argsets;
mod command;

use anyhow::{anyhow, Result};
use env_logger::Env;
use mqtt_driver::constants::{defaults, envvars};
use mqtt_driver::helpers::load_dotenv;

const CMD_RUN: &str = "run";
const CMD_CHECK_CONFIG: &str = "check-config";
const CMD_SCHEMA: &str = "schema";

const FLAG_STOP_ON_STDIN_EOF: &str = "--stop-on-stdin-eof";

fn main() -> Result<()> {
    load_dotenv();
    env_logger::Builder::from_env(
        Env::default().filter_or(envvars::LOGGING_LEVEL, defaults::LOG_LEVEL),
    )
    .init();

    let mut args = pico_args::Arguments::from_env();
    match args.subcommand()?.as_deref() {
        Some(CMD_RUN) => command::run(argsets::RunArgs {
            stop_on_stdin_eof: args.contains(FLAG_STOP_ON_STDIN_EOF),
            config_path: args.free_from_str()?,
        }),
        Some(CMD_CHECK_CONFIG) => command::check_config(argsets::CheckConfigArgs {
            config_path: args.free_from_str()?,
        }),
        Some(CMD_SCHEMA) => command::schema(),
        _ => Err(anyhow!(
            "Subcommand must be one of 'run', 'check-config', 'schema'"
        )),
    }
}
