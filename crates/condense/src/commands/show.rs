use condense_compress::ContextStore;
use condense_core::parse_best_effort;
use condense_telemetry::Paths;

pub fn run(owner: Option<&str>, json: bool) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    println!("{}", render_show(&paths, owner, json)?);
    Ok(())
}

fn render_show(paths: &Paths, owner: Option<&str>, json: bool) -> anyhow::Result<String> {
    let store = ContextStore::new(paths.clone());

    let Some(owner) = owner else {
        let owners = store.owners()?;
        if json {
            return Ok(serde_json::to_string_pretty(&owners)?);
        }
        if owners.is_empty() {
            return Ok("No stored contexts".to_string());
        }
        let mut out = format!("Owners ({})\n", owners.len());
        for owner in &owners {
            out.push_str(&format!("  {}\n", owner));
        }
        return Ok(out.trim_end().to_string());
    };

    let text = store
        .load(owner)?
        .ok_or_else(|| anyhow::anyhow!("no context stored for {owner}"))?;
    if !json {
        return Ok(text);
    }
    let (doc, _) = parse_best_effort(&text)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}
