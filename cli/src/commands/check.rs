use anyhow::Result;
use grabmodels_core::manager::InstallManifest;
use grabmodels_core::ModelManager;
use std::path::Path;

/// Report every registered model, then fail if any is missing.
pub fn execute(manager: &ModelManager, base: &Path) -> Result<()> {
    println!("Models directory: {:?}\n", base);

    for (key, dir) in manager.model_dirs(base) {
        let status = if !dir.exists() {
            "missing".to_string()
        } else {
            match InstallManifest::read(&dir) {
                Some(manifest) => format!("installed {}", manifest.installed_at.format("%Y-%m-%d %H:%M")),
                None => "present".to_string(),
            }
        };
        println!("  {:<12} {:<28} {:?}", key.as_str(), status, dir);
    }

    manager.assert_present(base)?;
    Ok(())
}
