//! Backs `aminer-rs config init`.

use std::path::PathBuf;

use crate::config::generate;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        generate::init(None, true)?;
        return Ok(());
    }

    let target = default_target();
    generate::init(Some(&target), false)?;
    println!("Wrote starter config to {}", target.display());
    Ok(())
}

fn default_target() -> PathBuf {
    dirs::home_dir().map(|home| home.join(".config/aminer-rs/config.yml")).unwrap_or_else(|| PathBuf::from("/etc/aminer-rs/config.yml"))
}
