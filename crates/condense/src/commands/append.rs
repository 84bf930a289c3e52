use super::read_text_arg;
use condense_compress::ContextStore;
use condense_core::{parse_best_effort, render, ParseStatus, SectionKind};
use condense_telemetry::Paths;

pub fn run(owner: &str, section: &str, role: &str, content: &str) -> anyhow::Result<()> {
    let paths = Paths::new()?;
    let content = read_text_arg(content)?;
    let section: SectionKind = section.parse()?;
    append_to_owner(&paths, owner, section, role, &content)?;
    println!("✓ Appended to {} for {}", section.tag(), owner);
    Ok(())
}

fn append_to_owner(
    paths: &Paths,
    owner: &str,
    section: SectionKind,
    role: &str,
    content: &str,
) -> anyhow::Result<()> {
    let store = ContextStore::new(paths.clone());
    let text = store.load_or_init(owner)?;
    let (mut doc, status) = parse_best_effort(&text)?;
    if status == ParseStatus::Recovered {
        tracing::warn!(owner, "stored context was malformed, rewriting recovered document");
    }
    doc.append(section, content, role);
    store.save(owner, &render(&doc))
}
