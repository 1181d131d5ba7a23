//! Per-chunk hook for relayed traffic

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;

/// Which way a chunk travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to remote
    Outbound,
    /// Remote to client
    Inbound,
}

impl Direction {
    pub fn arrow(self) -> &'static str {
        match self {
            Self::Outbound => ">>",
            Self::Inbound => "<<",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}

/// One direction of a relayed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flow {
    pub direction: Direction,
    /// Peer address of the inbound connection
    pub client: SocketAddr,
    /// Peer address of the outbound connection
    pub remote: SocketAddr,
}

impl Flow {
    pub fn new(direction: Direction, client: SocketAddr, remote: SocketAddr) -> Self {
        Self {
            direction,
            client,
            remote,
        }
    }

    /// The same connection seen from the other direction
    pub fn reversed(&self) -> Self {
        let direction = match self.direction {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        };
        Self { direction, ..*self }
    }

    /// Peer the chunk was read from
    pub fn source(&self) -> SocketAddr {
        match self.direction {
            Direction::Outbound => self.client,
            Direction::Inbound => self.remote,
        }
    }

    /// Peer the chunk is written to
    pub fn destination(&self) -> SocketAddr {
        match self.direction {
            Direction::Outbound => self.remote,
            Direction::Inbound => self.client,
        }
    }
}

/// Inspects or rewrites every chunk before it is forwarded
///
/// Closures of the shape `Fn(&[u8], &Flow) -> Vec<u8>` are handlers too.
pub trait Handler: Send + Sync + 'static {
    /// Bytes to forward in place of `chunk`
    fn handle<'a>(&self, chunk: &'a [u8], _flow: &Flow) -> Cow<'a, [u8]> {
        Cow::Borrowed(chunk)
    }

    /// Called once when the source of `flow` reaches EOF
    fn closed(&self, _flow: &Flow) {}
}

/// Forwards bytes untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Handler for Passthrough {}

impl<F> Handler for F
where
    F: Fn(&[u8], &Flow) -> Vec<u8> + Send + Sync + 'static,
{
    fn handle<'a>(&self, chunk: &'a [u8], flow: &Flow) -> Cow<'a, [u8]> {
        Cow::Owned(self(chunk, flow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow() -> Flow {
        Flow::new(
            Direction::Outbound,
            "127.0.0.1:5000".parse().unwrap(),
            "10.0.0.1:80".parse().unwrap(),
        )
    }

    #[test]
    fn test_flow_endpoints() {
        let outbound = flow();
        assert_eq!(outbound.source().port(), 5000);
        assert_eq!(outbound.destination().port(), 80);

        let inbound = outbound.reversed();
        assert_eq!(inbound.direction, Direction::Inbound);
        assert_eq!(inbound.source().port(), 80);
        assert_eq!(inbound.destination().port(), 5000);
        assert_eq!(inbound.direction.to_string(), "<<");
    }

    #[test]
    fn test_passthrough_borrows() {
        let out = Passthrough.handle(b"abc", &flow());
        assert!(matches!(out, Cow::Borrowed(b"abc")));
    }

    #[test]
    fn test_closure_handler() {
        let upper = |chunk: &[u8], _flow: &Flow| chunk.to_ascii_uppercase();
        assert_eq!(upper.handle(b"abc", &flow()).as_ref(), b"ABC");
    }
}
