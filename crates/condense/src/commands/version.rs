pub fn run() -> anyhow::Result<()> {
    println!("condense {}", env!("CARGO_PKG_VERSION"));
    println!("Token-budgeted compression of agent context documents");
    Ok(())
}
