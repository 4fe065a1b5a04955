use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tracing::level_filters::LevelFilter;

#[derive(clap::Parser)]
pub struct Arguments {
    /// Address the HTTP and WebSocket API binds to.
    #[clap(long, env, default_value = "0.0.0.0:3000")]
    pub bind_address: SocketAddr,

    /// Address the Prometheus exposition endpoint binds to.
    #[clap(long, env, default_value = "0.0.0.0:9586")]
    pub metrics_address: SocketAddr,

    #[clap(long, env, default_value = "warn,coordinator=debug,model=debug")]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    /// Path to the TOML file with the per-chain settings.
    #[clap(long, env, default_value = "chains.toml")]
    pub config: PathBuf,

    /// The anti-front-running window between receiving a fill request and
    /// issuing the approval. Zero disables the post-delay re-validation.
    #[clap(long, env, default_value = "1s", value_parser = humantime::parse_duration)]
    pub selective_delay: Duration,

    /// How long an issued approval stays valid.
    #[clap(long, env, default_value = "90s", value_parser = humantime::parse_duration)]
    pub approval_duration: Duration,
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let Arguments {
            bind_address,
            metrics_address,
            log_filter,
            log_stderr_threshold,
            config,
            selective_delay,
            approval_duration,
        } = self;

        writeln!(f, "bind_address: {bind_address}")?;
        writeln!(f, "metrics_address: {metrics_address}")?;
        writeln!(f, "log_filter: {log_filter}")?;
        writeln!(f, "log_stderr_threshold: {log_stderr_threshold}")?;
        writeln!(f, "config: {}", config.display())?;
        writeln!(f, "selective_delay: {selective_delay:?}")?;
        writeln!(f, "approval_duration: {approval_duration:?}")?;
        Ok(())
    }
}
