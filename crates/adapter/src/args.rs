use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};
use session::ProbeMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct Args {
    /// Address to accept IDE connections on
    #[clap(short, long, default_value = "127.0.0.1:4711")]
    pub listen: SocketAddr,

    /// Address of the debug server next to the debuggee, e.g. a debugpy adapter
    ///
    /// Defaults to the `connect` section of the chosen launch configuration.
    #[clap(short, long)]
    pub backend: Option<String>,

    /// Exit after the first session ends
    #[clap(long)]
    pub oneshot: bool,

    #[clap(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Seconds to wait for the debuggee to serve source content
    #[clap(long, default_value_t = 30)]
    pub fetch_timeout_secs: u64,

    /// How to decide whether a mapped local path exists: auto, host or assume
    #[clap(long, default_value_t = ProbeMode::Auto)]
    pub probe: ProbeMode,

    /// VS Code launch.json or .code-workspace file supplying default path mappings
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Name of the launch configuration to choose
    #[clap(short, long, requires = "config")]
    pub name: Option<String>,
}

impl Args {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
