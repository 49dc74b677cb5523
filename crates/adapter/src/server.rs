use eyre::WrapErr;
use session::SourceReference;
use tokio::net::{TcpListener, TcpStream};

use crate::{SessionOptions, run_session};

/// Accepts IDE connections and bridges each one to a fresh backend connection.
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    backend_address: String,
    options: SessionOptions,
    oneshot: bool,
}

impl Server {
    pub fn new(listener: TcpListener, backend_address: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            listener,
            backend_address: backend_address.into(),
            options,
            oneshot: false,
        }
    }

    /// Stop after the first session.
    pub fn oneshot(mut self, oneshot: bool) -> Self {
        self.oneshot = oneshot;
        self
    }

    pub fn local_addr(&self) -> eyre::Result<std::net::SocketAddr> {
        self.listener.local_addr().wrap_err("reading listener address")
    }

    /// Run sessions one after another.
    ///
    /// Each session's source references start above every reference an
    /// earlier session handed out.
    pub async fn run(self) -> eyre::Result<()> {
        let mut floor: SourceReference = 0;
        loop {
            let (client, peer) = self
                .listener
                .accept()
                .await
                .wrap_err("accepting client connection")?;
            tracing::info!(%peer, "client connected");

            match self.session(client, floor).await {
                Ok(high_water) => floor = floor.max(high_water),
                Err(e) => tracing::error!(error = %e, %peer, "session failed"),
            }

            if self.oneshot {
                tracing::debug!("oneshot mode, stopping");
                return Ok(());
            }
        }
    }

    async fn session(&self, client: TcpStream, floor: SourceReference) -> eyre::Result<SourceReference> {
        client.set_nodelay(true).wrap_err("configuring client socket")?;
        let backend = TcpStream::connect(&self.backend_address)
            .await
            .wrap_err_with(|| format!("connecting to backend at {}", self.backend_address))?;
        backend.set_nodelay(true).wrap_err("configuring backend socket")?;
        tracing::debug!(backend = %self.backend_address, "backend connected");

        run_session(client, backend, &self.options, floor).await
    }
}
