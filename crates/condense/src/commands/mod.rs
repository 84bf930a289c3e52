pub mod append;
pub mod compress;
pub mod history;
pub mod init;
pub mod show;
pub mod version;

use anyhow::Context;
use std::io::Read;

/// Resolve a text argument: `@path` reads a file, `-` reads stdin,
/// anything else is taken literally
pub fn read_text_arg(value: &str) -> anyhow::Result<String> {
    if value == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    match value.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {path}")),
        None => Ok(value.to_string()),
    }
}
