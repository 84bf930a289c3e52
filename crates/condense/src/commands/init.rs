use condense_compress::ContextStore;
use condense_telemetry::Paths;

pub fn run(owner: &str) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let created = init_owner(&paths, owner)?;
    let path = paths.context_file(owner);
    if created {
        println!("✓ Created empty context at {}", path.display());
    } else {
        println!("Context already exists at {}", path.display());
    }
    Ok(())
}

/// Returns whether a new document was written
fn init_owner(paths: &Paths, owner: &str) -> anyhow::Result<bool> {
    let store = ContextStore::new(paths.clone());
    if store.exists(owner)? {
        return Ok(false);
    }
    store.load_or_init(owner)?;
    Ok(true)
}
