use anyhow::Result;
use grabmodels_core::registry::ModelRegistry;
use grabmodels_core::Config;
use std::path::Path;

pub fn execute(config: &Config, registry: &ModelRegistry, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) if path.exists() => println!("# Configuration file: {:?}", path),
        Some(path) => println!("# Configuration file: {:?} (not found, using defaults)", path),
        None => println!("# Configuration file: (no config directory)"),
    }
    println!(
        "# SAS credential: {}",
        config.credential.as_ref().map(|_| "***").unwrap_or("(not set)")
    );
    println!();
    print!("{}", toml::to_string_pretty(config)?);

    println!();
    println!("# Registered models");
    for entry in registry.list() {
        println!(
            "#   {:<12} -> {:<12} {}",
            entry.key.as_str(),
            entry.subdir,
            entry.url
        );
    }
    Ok(())
}
