fn main() -> anyhow::Result<()> {
    breachdb::run()?;
    Ok(())
}
