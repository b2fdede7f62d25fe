fn main() -> anyhow::Result<()> {
    // One user, one pass at a time: a single-threaded runtime is enough.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(dashboard_server::run_server())
}
