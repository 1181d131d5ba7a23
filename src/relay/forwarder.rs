//! Data forwarding module
//!
//! Pumps bytes between the inbound and outbound streams of one relayed
//! connection, passing every chunk through the relay's handler.

use bytes::BytesMut;
use log::debug;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::handler::{Direction, Flow, Handler};

/// Forward data between two streams until one direction stops
///
/// `outbound` describes the client to remote direction. When either direction
/// reaches EOF or fails, the other one is cancelled and both streams are closed.
/// Both directions run inside the caller's task, so cancelling that task tears
/// the whole connection down. Returns the bytes read on the (outbound, inbound)
/// directions; the cancelled direction reports zero.
pub async fn proxy_data<C, R>(
    client: C,
    remote: R,
    outbound: Flow,
    handler: Arc<dyn Handler>,
    buffer_size: usize,
) -> (u64, u64)
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (remote_reader, remote_writer) = tokio::io::split(remote);

    let inbound = outbound.reversed();
    let client_to_remote = pump(
        client_reader,
        remote_writer,
        outbound,
        Arc::clone(&handler),
        buffer_size,
    );
    let remote_to_client = pump(remote_reader, client_writer, inbound, handler, buffer_size);

    // The first direction to finish tears down the connection
    let totals = tokio::select! {
        sent = client_to_remote => {
            debug!("[Inactive] {}", inbound.source());
            (sent, 0)
        }
        received = remote_to_client => {
            debug!("[Inactive] {}", outbound.source());
            (0, received)
        }
    };

    debug!(
        "[Closed] {} <=> {} ({} bytes out, {} bytes in)",
        outbound.client, outbound.remote, totals.0, totals.1
    );
    totals
}

async fn pump<Rd, Wr>(
    mut reader: Rd,
    mut writer: Wr,
    flow: Flow,
    handler: Arc<dyn Handler>,
    buffer_size: usize,
) -> u64
where
    Rd: AsyncRead + Unpin,
    Wr: AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(buffer_size);
    let mut total_bytes = 0u64;

    loop {
        buffer.clear();
        match reader.read_buf(&mut buffer).await {
            Ok(0) => {
                handler.closed(&flow);
                break;
            }
            Ok(n) => {
                total_bytes += n as u64;
                match flow.direction {
                    Direction::Outbound => {
                        debug!("[>> {} bytes] {} >> {}", n, flow.client, flow.remote)
                    }
                    Direction::Inbound => {
                        debug!("[<< {} bytes] {} << {}", n, flow.client, flow.remote)
                    }
                }

                let chunk = handler.handle(&buffer[..n], &flow);
                if writer.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Read from {} failed: {}", flow.source(), e);
                break;
            }
        }
    }

    debug!("[Inactive] {}", flow.source());
    let _ = writer.shutdown().await;
    total_bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Passthrough;
    use std::borrow::Cow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::duplex;

    fn outbound() -> Flow {
        Flow::new(
            Direction::Outbound,
            "127.0.0.1:40000".parse().unwrap(),
            "127.0.0.1:6000".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_pump_applies_handler() {
        let (mut client, relay_side) = duplex(64);
        let (remote_side, mut remote) = duplex(64);

        let upper = |chunk: &[u8], _flow: &Flow| chunk.to_ascii_uppercase();
        let task = tokio::spawn(proxy_data(
            relay_side,
            remote_side,
            outbound(),
            Arc::new(upper),
            16,
        ));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HELLO");

        remote.write_all(b"world").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"WORLD");

        drop(client);
        let (sent, _) = task.await.unwrap();
        assert_eq!(sent, 5);
    }

    struct CountClosed(Arc<AtomicUsize>);

    impl Handler for CountClosed {
        fn handle<'a>(&self, chunk: &'a [u8], _flow: &Flow) -> Cow<'a, [u8]> {
            Cow::Borrowed(chunk)
        }

        fn closed(&self, flow: &Flow) {
            assert_eq!(flow.direction, Direction::Inbound);
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_remote_eof_closes_client() {
        let (mut client, relay_side) = duplex(64);
        let (remote_side, remote) = duplex(64);
        let closed = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(proxy_data(
            relay_side,
            remote_side,
            outbound(),
            Arc::new(CountClosed(Arc::clone(&closed))),
            16,
        ));

        drop(remote);
        task.await.unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_closes_both_sides() {
        let (mut client, relay_side) = duplex(64);
        let (remote_side, mut remote) = duplex(64);

        let task = tokio::spawn(proxy_data(
            relay_side,
            remote_side,
            outbound(),
            Arc::new(Passthrough),
            16,
        ));

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
        remote.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
