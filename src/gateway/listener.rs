//! TLS listener exposing client certificates to handlers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::connect_info::Connected;
use axum::serve::{IncomingStream, Listener};
use rustls::pki_types::CertificateDer;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_rustls::{TlsAcceptor, server::TlsStream};
use tracing::{debug, error, warn};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Completed handshakes waiting for the server to pick them up
const HANDSHAKE_BACKLOG: usize = 128;

type Handshaken = (TlsStream<TcpStream>, SocketAddr);

/// Accepts TCP connections and completes TLS handshakes in the background.
///
/// Every accepted connection gets its own handshake task, so a client that
/// stalls mid-handshake only holds up itself. Finished connections are handed
/// to the server in completion order; failed handshakes are logged and
/// dropped.
pub struct TlsListener {
    incoming: mpsc::Receiver<Handshaken>,
    local_addr: SocketAddr,
    accept_task: AbortHandle,
}

impl TlsListener {
    /// Start accepting on a bound TCP listener.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub fn new(listener: TcpListener, acceptor: TlsAcceptor) -> io::Result<Self> {
        let local_addr = listener.local_addr()?;
        let (tx, incoming) = mpsc::channel(HANDSHAKE_BACKLOG);
        let accept_task = tokio::spawn(accept_loop(listener, acceptor, tx)).abort_handle();
        Ok(Self {
            incoming,
            local_addr,
            accept_task,
        })
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.incoming.recv().await {
            Some(connection) => connection,
            // The accept loop only stops once this listener is dropped.
            None => std::future::pending::<Handshaken>().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}

async fn accept_loop(listener: TcpListener, acceptor: TlsAcceptor, tx: mpsc::Sender<Handshaken>) {
    loop {
        let accepted = tokio::select! {
            () = tx.closed() => return,
            accepted = listener.accept() => accepted,
        };

        let (stream, addr) = match accepted {
            Ok(connection) => connection,
            Err(err) => {
                if !is_connection_error(&err) {
                    error!("HTTPS accept error: {err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => {
                    if tx.send((tls_stream, addr)).await.is_err() {
                        debug!(%addr, "Listener closed before connection was served");
                    }
                }
                Ok(Err(err)) => warn!(error = %err, %addr, "TLS handshake failed"),
                Err(_) => warn!(%addr, "TLS handshake timed out"),
            }
        });
    }
}

fn is_connection_error(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}

/// Per-connection data available to handlers through `ConnectInfo`.
#[derive(Debug, Clone)]
pub struct TlsConnectInfo {
    /// Client address
    pub remote_addr: SocketAddr,
    /// Certificate chain presented by the client, leaf first. Empty when the
    /// client sent none or the connection is plain HTTP.
    pub peer_certificates: Arc<[CertificateDer<'static>]>,
}

impl TlsConnectInfo {
    /// Connection without client certificates.
    #[must_use]
    pub fn anonymous(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            peer_certificates: Arc::from(Vec::new()),
        }
    }

    /// Connection that presented `chain`.
    #[must_use]
    pub fn with_certificates(remote_addr: SocketAddr, chain: Vec<CertificateDer<'static>>) -> Self {
        Self {
            remote_addr,
            peer_certificates: Arc::from(chain),
        }
    }
}

impl Connected<IncomingStream<'_, TlsListener>> for TlsConnectInfo {
    fn connect_info(stream: IncomingStream<'_, TlsListener>) -> Self {
        let (_, connection) = stream.io().get_ref();
        let chain = connection
            .peer_certificates()
            .map(<[CertificateDer<'static>]>::to_vec)
            .unwrap_or_default();
        debug!(remote_addr = %stream.remote_addr(), certificates = chain.len(), "Accepted TLS connection");
        Self::with_certificates(*stream.remote_addr(), chain)
    }
}

impl Connected<IncomingStream<'_, TcpListener>> for TlsConnectInfo {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        Self::anonymous(*stream.remote_addr())
    }
}
