use std::net::SocketAddr;
use std::sync::Arc;

use axum::{serve::Listener, Router};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::error::Elapsed;
use tokio::time::Duration;
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::Error;

/// How long a client gets to finish the TLS handshake before its connection
/// is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bind a TCP listener, mapping failures to a transport error that names
/// the address.
pub async fn bind(addr: SocketAddr) -> crate::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind {}: {}", addr, e)))
}

/// Serve plain HTTP until `cancel` fires.
pub async fn serve_http(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "Starting HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::transport(format!("HTTP server error: {}", e)))?;

    info!(address = %addr, "HTTP server shutdown completed");
    Ok(())
}

/// Serve HTTPS with the given rustls configuration until `cancel` fires.
pub async fn serve_tls(
    listener: TcpListener,
    config: rustls::ServerConfig,
    router: Router,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr = listener.local_addr()?;
    info!(address = %addr, "Starting HTTPS server");

    let tls_listener = TlsListener::new(listener, TlsAcceptor::from(Arc::new(config)));
    axum::serve(tls_listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::transport(format!("HTTPS server error: {}", e)))?;

    info!(address = %addr, "HTTPS server shutdown completed");
    Ok(())
}

type Handshake = (SocketAddr, Result<std::io::Result<TlsStream<TcpStream>>, Elapsed>);

/// Accepts TCP connections and runs each TLS handshake on its own task, so
/// a client that stalls mid-handshake only holds up itself.
struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    handshakes: JoinSet<Handshake>,
}

impl TlsListener {
    fn new(listener: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { listener, acceptor, handshakes: JoinSet::new() }
    }

    fn start_handshake(&mut self, stream: TcpStream, addr: SocketAddr) {
        let acceptor = self.acceptor.clone();
        self.handshakes.spawn(async move {
            (addr, tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await)
        });
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.start_handshake(stream, addr),
                    Err(err) if is_connection_error(&err) => {}
                    Err(err) => {
                        error!("HTTPS accept error: {err}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
                Some(joined) = self.handshakes.join_next(), if !self.handshakes.is_empty() => {
                    match joined {
                        Ok((addr, Ok(Ok(tls_stream)))) => return (tls_stream, addr),
                        Ok((addr, Ok(Err(err)))) => warn!(error = %err, %addr, "TLS handshake failed"),
                        Ok((addr, Err(_))) => warn!(%addr, "TLS handshake timed out"),
                        Err(err) => debug!(error = %err, "TLS handshake task ended abnormally"),
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.listener.local_addr()
    }
}

fn is_connection_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}
