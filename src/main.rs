fn main() -> anyhow::Result<()> {
    delwatch::cli::run()
}
