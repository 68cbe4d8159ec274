use anyhow::{Context, Result};
use grabmodels_core::ModelManager;
use std::path::Path;

pub async fn execute(manager: &ModelManager, base: &Path) -> Result<()> {
    manager
        .ensure(base)
        .await
        .with_context(|| format!("Failed to provision models into {:?}", base))?;

    println!("Models ready in {:?}", base);
    for (key, dir) in manager.model_dirs(base) {
        println!("  {:<12} {:?}", key.as_str(), dir);
    }
    Ok(())
}
