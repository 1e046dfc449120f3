use tracing::{debug, error};

pub async fn shutdown_signal() {
    let str = wait_for_stop_signal().await;
    debug!("Received signal: {}", str);
}

/// Waits for SIGTERM or SIGINT.
#[cfg(unix)]
async fn wait_for_stop_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut signal_terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("SIGTERM handler error: {}", e);
            return std::future::pending().await;
        }
    };
    let mut signal_interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("SIGINT handler error: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = signal_terminate.recv() => "SIGTERM",
        _ = signal_interrupt.recv() => "SIGINT",
    }
}

/// Waits for Ctrl-C or a console close/shutdown event.
#[cfg(windows)]
async fn wait_for_stop_signal() -> &'static str {
    use tokio::signal::windows;

    let (Ok(mut signal_c), Ok(mut signal_close), Ok(mut signal_shutdown)) = (
        windows::ctrl_c(),
        windows::ctrl_close(),
        windows::ctrl_shutdown(),
    ) else {
        error!("console handler registration failed");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = signal_c.recv() => "CTRL_C",
        _ = signal_close.recv() => "CTRL_CLOSE",
        _ = signal_shutdown.recv() => "CTRL_SHUTDOWN",
    }
}

/// A config and the file it was read from; `None` means built-in defaults.
pub struct Loaded<T> {
    pub cfg: T,
    pub source: Option<String>,
}

/// Reads `path`, else `{name}.toml`, else `/etc/{name}/{name}.toml`, else
/// defaults. An explicit `path` must exist and every file read must parse.
pub fn load<T>(name: &str, path: Option<String>) -> anyhow::Result<Loaded<T>>
where
    T: serde::de::DeserializeOwned + std::default::Default,
{
    let candidates = match path {
        Some(path) => vec![(path, true)],
        None => vec![
            (format!("{name}.toml"), false),
            (format!("/etc/{name}/{name}.toml"), false),
        ],
    };
    for (path, required) in candidates {
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let cfg = toml::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("config {} error: {}", path, e))?;
                return Ok(Loaded {
                    cfg,
                    source: Some(path),
                });
            }
            Err(e) if required => return Err(anyhow::anyhow!("config {} error: {}", path, e)),
            Err(_) => {}
        }
    }
    Ok(Loaded {
        cfg: T::default(),
        source: None,
    })
}
