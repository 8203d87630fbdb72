//! Utility commands (cache management, etc.).

use anyhow::Result;

use crate::sync::SyncManager;

/// Remove every cached city and the remembered selection.
pub fn execute_clean_cache(manager: &SyncManager) -> Result<()> {
    let count = manager.clear_cache();
    println!("Cleared city cache: {} city(ies) removed", count);
    Ok(())
}

/// Drop expired cache entries only.
pub fn execute_purge(manager: &SyncManager) -> Result<()> {
    let count = manager.purge_expired();
    println!("Purged {} expired cache entr{}", count, if count == 1 { "y" } else { "ies" });
    Ok(())
}
