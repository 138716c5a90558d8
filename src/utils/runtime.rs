use anyhow::Result;

/// The daemon's tasks are joined on one thread. Desktop calls, which can block, run on the
/// blocking pool.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
