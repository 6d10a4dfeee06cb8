//! List command - show saved identities

use anyhow::Result;

use super::{identity_manager, GlobalArgs};
use crate::ui;

pub async fn run(args: &GlobalArgs) -> Result<()> {
    let config = args.config()?;
    let manager = identity_manager(&config);
    let names = manager.list()?;

    if names.is_empty() {
        ui::info("No identities found");
        ui::info("Run 'selfkit-demo setup' to create an identity");
        return Ok(());
    }

    let current = manager.current_name();
    ui::header("Saved Identities");
    for name in names {
        if current.as_deref() == Some(name.as_str()) {
            ui::key_value(&name, "current");
        } else {
            ui::key_value(&name, "");
        }
    }
    Ok(())
}
