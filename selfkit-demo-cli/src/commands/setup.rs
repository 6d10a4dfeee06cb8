//! Setup command - create a new identity

use anyhow::{bail, Result};
use selfkit_demo_core::{Identity, StorageKeySource};

use super::{identity_manager, GlobalArgs, DEFAULT_IDENTITY};
use crate::ui;

pub async fn run(args: &GlobalArgs, name: Option<String>) -> Result<()> {
    ui::header("Setup New Identity");

    let config = args.config()?;
    if config.storage_key_source == StorageKeySource::Generated {
        bail!("Set SELFKIT_STORAGE_KEY (64 hex characters) before creating a persistent identity");
    }

    let name = match name {
        Some(name) => name,
        None if ui::is_interactive() => ui::input("Enter a name for this identity")?,
        None => DEFAULT_IDENTITY.to_string(),
    };

    if args.verbose {
        ui::info(&format!("Creating identity '{}'...", name));
    }

    let manager = identity_manager(&config);
    if manager.list()?.contains(&name) {
        if !ui::is_interactive() {
            bail!("Identity '{}' already exists", name);
        }
        if !ui::confirm(
            &format!("Identity '{}' already exists. Overwrite?", name),
            false,
        )? {
            ui::info("Setup cancelled");
            return Ok(());
        }
    }

    let spinner = ui::spinner("Generating inbox key...");
    let identity = Identity::generate().with_nickname(&name);
    spinner.finish_and_clear();

    manager.save(&identity, &name)?;
    manager.set_current(&name)?;

    ui::success(&format!("Identity '{}' created and activated", name));
    ui::separator();
    ui::key_value("Address", &identity.address().to_string());
    ui::info(&format!(
        "Identity saved to: {}",
        config.identities_dir().join(format!("{}.json", name)).display()
    ));

    Ok(())
}
