use std::fs;
use std::io;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use mqtt_driver::data_mgmt::sink::JsonLinesSink;
use mqtt_driver::MqttDriver;

use crate::argsets::RunArgs;

pub fn run(args: RunArgs) -> Result<()> {
    let config_raw = fs::read_to_string(&args.config_path)
        .map_err(|e| anyhow!("Cannot read {}: {}", args.config_path.display(), e))?;

    let mut driver = MqttDriver::new(Arc::new(JsonLinesSink::stdout()));
    log::info!("Driver service id: {}", driver.service_id());
    driver.start(&config_raw)?;

    if args.stop_on_stdin_eof {
        log::info!("Driver running; close stdin to stop");
        io::copy(&mut io::stdin().lock(), &mut io::sink())?;
    } else {
        wait_for_termination()?;
    }

    driver.stop();
    Ok(())
}

fn wait_for_termination() -> Result<()> {
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;
    log::info!("Driver running; send SIGINT or SIGTERM to stop");
    stop_rx.recv()?;
    log::info!("Termination signal received");
    Ok(())
}
