use adapter::{
    DEFAULT_REQUEST_TIMEOUT, Server, SessionOptions,
    args::{Args, LogFormat},
};
use clap::Parser;
use eyre::WrapErr;
use launch_configuration::{ChosenLaunchConfiguration, LaunchConfiguration};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn init_logging(format: LogFormat) {
    // stdout is left alone; DAP tooling often captures it
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn choose_configuration(args: &Args) -> eyre::Result<Option<LaunchConfiguration>> {
    let Some(path) = &args.config else {
        return Ok(None);
    };
    match launch_configuration::load_from_path(args.name.as_deref(), path)
        .wrap_err("loading launch configuration")?
    {
        ChosenLaunchConfiguration::Specific(config) => Ok(Some(config)),
        ChosenLaunchConfiguration::NotFound => eyre::bail!(
            "no launch configuration named {:?} in {}",
            args.name.as_deref().unwrap_or_default(),
            path.display()
        ),
        ChosenLaunchConfiguration::ToBeChosen(names) => {
            eyre::bail!("choose a launch configuration with --name: {}", names.join(", "))
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(args.log_format);
    tracing::debug!(?args, "parsed command line arguments");

    let launch = choose_configuration(&args)?;
    let backend = match (&args.backend, launch.as_ref().and_then(|c| c.connect.as_ref())) {
        (Some(address), _) => address.clone(),
        (None, Some(connect)) => connect.address(),
        (None, None) => eyre::bail!("no backend address: pass --backend or a launch configuration with `connect`"),
    };

    let options = SessionOptions {
        probe: args.probe,
        fetch_timeout: args.fetch_timeout(),
        request_timeout: DEFAULT_REQUEST_TIMEOUT,
        defaults: launch.as_ref().map(LaunchConfiguration::session_arguments),
    };

    let listener = TcpListener::bind(args.listen)
        .await
        .wrap_err_with(|| format!("binding {}", args.listen))?;
    let server = Server::new(listener, backend, options).oneshot(args.oneshot);
    tracing::info!(listen = %server.local_addr()?, "waiting for IDE connections");

    server.run().await
}
