use anyhow::Result;
use grabmodels_core::ModelManager;
use std::path::Path;

pub fn execute(manager: &ModelManager, base: &Path, species: Option<&str>) -> Result<()> {
    match species {
        Some(species) => println!("{}", manager.species_trees_path(base, species).display()),
        None => println!("{}", base.display()),
    }
    Ok(())
}
