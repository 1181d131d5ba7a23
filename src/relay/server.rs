//! Relay server module
//!
//! Accepts inbound connections, optionally terminates TLS, opens the outbound
//! connection (optionally originating TLS) and hands both streams to the
//! forwarder.

use log::{debug, error, info};
use openssl::ssl::{Ssl, SslAcceptor, SslConnector};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_openssl::SslStream;

use super::forwarder::proxy_data;
use super::handler::{Direction, Flow, Handler, Passthrough};
use super::message::{create_channel, RelayHandle, RelayMessage, RelayStats};
use crate::common::{bind_reuse_listener, parse_socket_addr, Result, UtilError};
use crate::config::RelaySettings;
use crate::tls::{client_ssl, create_tls_acceptor, insecure_connector, self_signed_acceptor};

/// Common name of the generated listener certificate
const SELF_SIGNED_CN: &str = "localhost";

trait RelayStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RelayStream for T {}

type BoxedStream = Box<dyn RelayStream>;

/// State shared by every connection task
struct ConnectionContext {
    settings: RelaySettings,
    remote_host: String,
    remote_port: u16,
    acceptor: Option<SslAcceptor>,
    connector: Option<SslConnector>,
    handler: Arc<dyn Handler>,
}

/// TCP/TLS relay
///
/// # Example
///
/// ```no_run
/// # use utilkit::config::RelaySettings;
/// # use utilkit::relay::Relay;
/// # async fn demo() -> utilkit::Result<()> {
/// let relay = Relay::new(RelaySettings::new("127.0.0.1:8443", "example.com:80"))?;
/// relay.run().await
/// # }
/// ```
pub struct Relay {
    context: Arc<ConnectionContext>,
}

impl Relay {
    /// Create a relay with a passthrough handler
    ///
    /// Settings are validated and TLS material is prepared up front.
    pub fn new(settings: RelaySettings) -> Result<Self> {
        settings.validate()?;
        let (remote_host, remote_port) = settings.remote_host_port()?;

        let acceptor = match (&settings.server_cert, &settings.server_key) {
            (Some(cert), Some(key)) => Some(create_tls_acceptor(cert, key)?),
            _ if settings.tls_server => Some(self_signed_acceptor(SELF_SIGNED_CN)?),
            _ => None,
        };
        let connector = if settings.tls_upstream {
            Some(insecure_connector()?)
        } else {
            None
        };

        Ok(Self {
            context: Arc::new(ConnectionContext {
                settings,
                remote_host,
                remote_port,
                acceptor,
                connector,
                handler: Arc::new(Passthrough),
            }),
        })
    }

    /// Replace the chunk handler
    pub fn with_handler(self, handler: impl Handler) -> Self {
        self.with_shared_handler(Arc::new(handler))
    }

    pub fn with_shared_handler(self, handler: Arc<dyn Handler>) -> Self {
        let context = match Arc::try_unwrap(self.context) {
            Ok(mut context) => {
                context.handler = handler;
                context
            }
            Err(shared) => ConnectionContext {
                settings: shared.settings.clone(),
                remote_host: shared.remote_host.clone(),
                remote_port: shared.remote_port,
                acceptor: shared.acceptor.clone(),
                connector: shared.connector.clone(),
                handler,
            },
        };
        Self {
            context: Arc::new(context),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.context.settings
    }

    /// Bind the listening socket with `SO_REUSEADDR`
    pub fn bind(&self) -> Result<TcpListener> {
        let addr = parse_socket_addr(&self.context.settings.listen)?;
        let listener = bind_reuse_listener(addr)?;
        Ok(TcpListener::from_std(listener)?)
    }

    /// Serve until the process ends or accepting fails fatally
    pub async fn run(self) -> Result<()> {
        let listener = self.bind()?;
        // Keep the sender alive so the control branch stays idle
        let (_sender, receiver) = create_channel();
        self.serve(listener, receiver).await
    }

    /// Serve in the background and return a control handle
    pub async fn start(self) -> Result<RelayHandle> {
        let listener = self.bind()?;
        let local_addr = listener.local_addr()?;
        let (sender, receiver) = create_channel();
        let task = tokio::spawn(self.serve(listener, receiver));
        Ok(RelayHandle::new(local_addr, sender, task))
    }

    async fn serve(
        self,
        listener: TcpListener,
        mut receiver: mpsc::Receiver<RelayMessage>,
    ) -> Result<()> {
        info!(
            "Relay started, listening on {}: {}",
            listener.local_addr()?,
            self.context.settings
        );

        let mut tasks = JoinSet::new();
        let mut accepted = 0u64;

        loop {
            tokio::select! {
                incoming = listener.accept() => match incoming {
                    Ok((client_stream, client_addr)) => {
                        accepted += 1;
                        info!("Accepted connection from {}", client_addr);
                        let context = Arc::clone(&self.context);
                        tasks.spawn(async move {
                            if let Err(e) = handle_connection(client_stream, client_addr, context).await {
                                error!("Connection from {} failed: {}", client_addr, e);
                            }
                        });
                    }
                    Err(e) => error!("Error accepting connection: {}", e),
                },
                Some(message) = receiver.recv() => match message {
                    RelayMessage::Stats(reply) => {
                        let _ = reply.send(RelayStats {
                            active: tasks.len(),
                            accepted,
                        });
                    }
                    RelayMessage::Shutdown => {
                        info!("Relay on {} shutting down", listener.local_addr()?);
                        tasks.shutdown().await;
                        return Ok(());
                    }
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        if !e.is_cancelled() {
                            error!("Task error: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Relay a single inbound connection
async fn handle_connection(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    context: Arc<ConnectionContext>,
) -> Result<()> {
    let client: BoxedStream = match &context.acceptor {
        Some(acceptor) => Box::new(accept_tls(acceptor, client_stream).await?),
        None => Box::new(client_stream),
    };

    let settings = &context.settings;
    let remote_stream = timeout(
        settings.connect_timeout_duration(),
        TcpStream::connect((context.remote_host.as_str(), context.remote_port)),
    )
    .await
    .map_err(|_| UtilError::Timeout(format!("connecting to {}", settings.remote)))??;
    let remote_addr = remote_stream.peer_addr()?;

    let remote: BoxedStream = match &context.connector {
        Some(connector) => {
            Box::new(connect_tls(connector, &context.remote_host, remote_stream).await?)
        }
        None => Box::new(remote_stream),
    };

    debug!("[Established] {} <=> {}", client_addr, remote_addr);
    let outbound = Flow::new(Direction::Outbound, client_addr, remote_addr);
    proxy_data(
        client,
        remote,
        outbound,
        Arc::clone(&context.handler),
        settings.buffer_size,
    )
    .await;

    Ok(())
}

async fn accept_tls(acceptor: &SslAcceptor, stream: TcpStream) -> Result<SslStream<TcpStream>> {
    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, stream)?;

    Pin::new(&mut stream)
        .accept()
        .await
        .map_err(|e| UtilError::TlsHandshake(e.to_string()))?;

    debug!("TLS handshake with client successful");
    Ok(stream)
}

async fn connect_tls(
    connector: &SslConnector,
    host: &str,
    stream: TcpStream,
) -> Result<SslStream<TcpStream>> {
    let ssl = client_ssl(connector, host)?;
    let mut stream = SslStream::new(ssl, stream)?;

    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| UtilError::TlsHandshake(e.to_string()))?;

    debug!("TLS handshake with {} successful", host);
    Ok(stream)
}

/// Run the relay on the current runtime until it stops
pub async fn run_proxy_async<H: Handler>(settings: RelaySettings, handler: H) -> Result<()> {
    Relay::new(settings)?.with_handler(handler).run().await
}

/// Run the relay on a dedicated runtime, blocking the calling thread
pub fn run_proxy<H: Handler>(settings: RelaySettings, handler: H) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("utilkit-relay")
        .enable_all()
        .build()?;
    runtime.block_on(run_proxy_async(settings, handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_new() {
        let relay = Relay::new(RelaySettings::new("127.0.0.1:0", "127.0.0.1:6000")).unwrap();
        assert!(relay.context.acceptor.is_none());
        assert!(relay.context.connector.is_none());
        assert_eq!(relay.context.remote_port, 6000);
    }

    #[test]
    fn test_relay_tls_material() {
        let mut settings = RelaySettings::new("127.0.0.1:0", "example.com:443");
        settings.tls_server = true;
        settings.tls_upstream = true;

        let relay = Relay::new(settings).unwrap();
        assert!(relay.context.acceptor.is_some());
        assert!(relay.context.connector.is_some());
        assert_eq!(relay.context.remote_host, "example.com");
    }

    #[test]
    fn test_relay_rejects_bad_remote() {
        assert!(Relay::new(RelaySettings::new("127.0.0.1:0", "no-port")).is_err());
    }

    #[tokio::test]
    async fn test_start_and_stats() {
        let relay = Relay::new(RelaySettings::new("127.0.0.1:0", "127.0.0.1:1")).unwrap();
        let handle = relay.start().await.unwrap();
        assert_ne!(handle.local_addr().port(), 0);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats, RelayStats::default());
        handle.shutdown().await.unwrap();
    }
}
