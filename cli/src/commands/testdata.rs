use anyhow::{Context, Result};
use grabmodels_core::ModelManager;

pub async fn execute(manager: &ModelManager, key: &str, ensure: bool) -> Result<()> {
    let dir = manager
        .testdata_dir(key, ensure)
        .await
        .with_context(|| format!("Failed to fetch test data '{}'", key))?;

    if !dir.exists() {
        tracing::warn!("Test data '{}' has not been downloaded yet", key);
    }
    println!("{}", dir.display());
    Ok(())
}
