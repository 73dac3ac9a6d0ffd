/// TCP accept loop and revision fan-out
use crate::error::Result;
use crate::session::{Connection, ConnectionPool};
use crate::state::AppState;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Accept connections until `shutdown` resolves, then stop every connection
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let Self { listener, state } = self;
        let pool = state.pool.clone();

        let fan_out = tokio::spawn(fan_out(
            state.library.subscribe(),
            pool.clone(),
            pool.shutdown_token(),
        ));

        tracing::info!(addr = ?listener.local_addr().ok(), "Listening for DAAP clients");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let registration = match pool.register() {
                        Ok(registration) => registration,
                        Err(e) => {
                            tracing::debug!(%peer, "Refusing connection: {}", e);
                            continue;
                        }
                    };

                    let _ = stream.set_nodelay(true);
                    let span = tracing::info_span!("connection", id = registration.id, %peer);
                    let connection = Connection::new(stream, state.clone(), registration);
                    tokio::spawn(connection.run().instrument(span));
                }
            }
        }

        tracing::info!("Shutting down");
        pool.shutdown();
        let _ = fan_out.await;
        Ok(())
    }
}

/// Push every committed revision onto all live sessions
async fn fan_out(
    mut revisions: watch::Receiver<u32>,
    pool: Arc<ConnectionPool>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let revision = *revisions.borrow_and_update();
                tracing::debug!(revision, "Library revision committed");
                pool.broadcast(revision);
            }
        }
    }
}
