use anyhow::{Context, Result};
use grabmodels_core::ModelManager;
use std::path::Path;

pub async fn execute(manager: &ModelManager, base: &Path) -> Result<()> {
    println!("Removing {:?} and downloading all models again...", base);
    manager
        .redownload(base)
        .await
        .with_context(|| format!("Failed to redownload models into {:?}", base))?;
    println!("Done.");
    Ok(())
}
