use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

/// Installs a file-backed subscriber. Without a path nothing is installed,
/// since the terminal belongs to the renderer.
pub fn init(log_file: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fractal_visualizer=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();

    tracing::info!("fractal-visualizer v{} starting", env!("CARGO_PKG_VERSION"));
    Ok(())
}
