use anyhow::Result;
use mqtt_driver::driver::SCHEMA;

pub fn schema() -> Result<()> {
    println!("{SCHEMA}");
    Ok(())
}
