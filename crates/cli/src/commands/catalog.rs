use perftrack_storage::Catalog;

pub(crate) fn run() -> anyhow::Result<()> {
    let catalog = Catalog::builtin();
    println!("{}", serde_json::to_string_pretty(catalog.entries())?);
    Ok(())
}
