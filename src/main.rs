fn main() -> anyhow::Result<()> {
    flingbox::app::run()
}
