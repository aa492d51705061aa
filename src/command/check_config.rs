use std::fs;

use anyhow::{anyhow, Result};
use itertools::Itertools;
use mqtt_driver::config;
use mqtt_driver::driver::TableSubscription;
use mqtt_driver::script::JsonataEngine;

use crate::argsets::CheckConfigArgs;

/// Print what `run` would subscribe to, table by table
pub fn check_config(args: CheckConfigArgs) -> Result<()> {
    let config_raw = fs::read_to_string(&args.config_path)
        .map_err(|e| anyhow!("Cannot read {}: {}", args.config_path.display(), e))?;
    let config = config::from_str(&config_raw)?;

    let server = config
        .settings()
        .and_then(|s| s.server.as_deref())
        .unwrap_or("<none>");
    println!(
        "Driver instance '{}' ({} table(s)), broker {}",
        config.id,
        config.tables.len(),
        server
    );

    for table in config.tables.iter() {
        match TableSubscription::activate(table, config.config.as_ref(), &JsonataEngine) {
            Ok(Some(subscription)) => {
                let index = subscription.pipeline().index();
                println!(
                    "{}: topic '{}', {} of {} device(s) routable [{}]",
                    table.id,
                    subscription.topic(),
                    index.len(),
                    table.devices.len(),
                    index.device_ids().iter().join(", ")
                );
            }
            Ok(None) => println!("{}: skipped", table.id),
            Err(e) => println!("{}: error: {}", table.id, e),
        }
    }
    Ok(())
}
