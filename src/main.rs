fn main() -> anyhow::Result<()> {
    barolog_lib::run()
}
