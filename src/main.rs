use clap::Parser;
use tracing::{debug, info, warn};

mod log;
mod utils;

#[derive(Parser)]
#[command(version)]
struct Args {
    /// Set config file path
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let utils::Loaded { cfg, source } =
        utils::load::<liverelay::config::Config>("camrelay", args.config)?;
    cfg.validate()?;

    log::set(format!(
        "camrelay={},liverelay={},relay={},camsdp={},rumqttc=warn",
        cfg.log.level, cfg.log.level, cfg.log.level, cfg.log.level
    ));

    match source {
        Some(path) => info!("config loaded from {}", path),
        None => warn!("no config file found, using defaults"),
    }
    warn!("set log level : {}", cfg.log.level);
    debug!("config : {:?}", cfg);

    liverelay::metrics_register();
    let listener = tokio::net::TcpListener::bind(cfg.http.listen).await?;
    info!("Server listening on {}", listener.local_addr()?);

    liverelay::serve(cfg, listener, utils::shutdown_signal()).await?;
    info!("Server shutdown");
    Ok(())
}
