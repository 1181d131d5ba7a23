//! Network utility functions
//!
//! Address parsing plus small helpers over blocking `std::net` sockets.

use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use super::error::{Result, UtilError};

const RECV_CHUNK: usize = 1024;

/// Parse a socket address
///
/// Accepts literal addresses as well as resolvable `host:port` strings.
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| UtilError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(UtilError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Split `host:port` into its parts, keeping bracketed IPv6 hosts intact
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| UtilError::Config(format!("Expected host:port, got {}", addr)))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| UtilError::Config(format!("Invalid port in {}", addr)))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(UtilError::Config(format!("Missing host in {}", addr)));
    }
    Ok((host.to_string(), port))
}

/// Bind a listening socket with `SO_REUSEADDR` set
///
/// The returned listener is non-blocking so it can be handed to tokio.
pub fn bind_reuse_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(unix)]
fn raw_handle<S: std::os::unix::io::AsRawFd>(sock: &S) -> i64 {
    sock.as_raw_fd() as i64
}

#[cfg(windows)]
fn raw_handle<S: std::os::windows::io::AsRawSocket>(sock: &S) -> i64 {
    sock.as_raw_socket() as i64
}

/// Describe a connected stream, e.g. `[fd: 7, L:/127.0.0.1:2069 - R:/127.0.0.1:55666]`
pub fn sockinfo(stream: &TcpStream) -> String {
    let fd = raw_handle(stream);
    match (stream.local_addr(), stream.peer_addr()) {
        (Ok(local), Ok(peer)) => format!("[fd: {}, L:/{} - R:/{}]", fd, local, peer),
        (Ok(_), Err(_)) => format!("[fd: {}, LISTENING]", fd),
        _ => format!("[fd: {}, CLOSED]", fd),
    }
}

/// Describe a listening socket, e.g. `[fd: 5, L:/0.0.0.0:8080, LISTENING]`
pub fn listener_info(listener: &TcpListener) -> String {
    let fd = raw_handle(listener);
    match listener.local_addr() {
        Ok(local) => format!("[fd: {}, L:/{}, LISTENING]", fd, local),
        Err(_) => format!("[fd: {}, CLOSED]", fd),
    }
}

/// Open a blocking TCP connection to `host:port`
pub fn sock_connect(host: &str, port: u16) -> io::Result<TcpStream> {
    TcpStream::connect((host, port))
}

/// Run `f` with the socket switched to non-blocking mode, then restore its previous mode
fn with_nonblocking<T>(socket: SockRef<'_>, f: impl FnOnce() -> T) -> io::Result<T> {
    let was_nonblocking = is_nonblocking(&socket)?;
    socket.set_nonblocking(true)?;
    let out = f();
    socket.set_nonblocking(was_nonblocking)?;
    Ok(out)
}

#[cfg(unix)]
fn is_nonblocking(socket: &Socket) -> io::Result<bool> {
    socket.nonblocking()
}

// The mode cannot be read back on Windows; sockets start out blocking there
#[cfg(not(unix))]
fn is_nonblocking(_socket: &Socket) -> io::Result<bool> {
    Ok(false)
}

/// Whether data (or EOF) can be read without blocking; EOF counts as not readable
pub fn is_readable(stream: &TcpStream) -> bool {
    let mut peeked = [0u8; 16];
    with_nonblocking(SockRef::from(stream), || stream.peek(&mut peeked))
        .ok()
        .and_then(|peeked| peeked.ok())
        .map(|n| n > 0)
        .unwrap_or(false)
}

/// Accept every pending connection without blocking
pub fn acceptall(listener: &TcpListener) -> io::Result<Vec<(TcpStream, SocketAddr)>> {
    let accepted = with_nonblocking(
        SockRef::from(listener),
        || {
            let mut result = Vec::new();
            while let Ok((stream, addr)) = listener.accept() {
                result.push((stream, addr));
            }
            result
        },
    )?;

    for (stream, _) in &accepted {
        stream.set_nonblocking(false)?;
    }
    Ok(accepted)
}

/// Read everything currently available
///
/// With a `timeout` the first read waits up to that long for data; after that the
/// socket is drained without blocking. Stops at EOF, on error, or when nothing is left.
pub fn recvall(stream: &mut TcpStream, timeout: Option<Duration>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; RECV_CHUNK];

    if let Some(timeout) = timeout.filter(|t| !t.is_zero()) {
        stream.set_read_timeout(Some(timeout))?;
        let first = stream.read(&mut chunk);
        stream.set_read_timeout(None)?;
        match first {
            Ok(0) | Err(_) => return Ok(buffer),
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
        }
    }

    let stream_ref: &TcpStream = stream;
    with_nonblocking(
        SockRef::from(stream_ref),
        || {
            let mut reader = stream_ref;
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        },
    )?;
    Ok(buffer)
}

/// Write as much of `buffer` as the socket accepts without blocking
///
/// A failed write is retried up to `spin` times before giving up.
///
/// # Returns
///
/// The part of `buffer` that was not sent.
pub fn sendall<'b>(stream: &mut TcpStream, buffer: &'b [u8], spin: u32) -> io::Result<&'b [u8]> {
    let stream_ref: &TcpStream = stream;
    let sent = with_nonblocking(
        SockRef::from(stream_ref),
        || {
            let mut writer = stream_ref;
            let mut spin = spin;
            let mut total = 0;
            while total < buffer.len() {
                match writer.write(&buffer[total..]) {
                    Ok(n) => total += n,
                    Err(_) if spin > 0 => spin -= 1,
                    Err(_) => break,
                }
            }
            total
        },
    )?;
    Ok(&buffer[sent..])
}

/// Whether something is accepting connections on `localhost:port`
pub fn is_port_in_use(port: u16) -> bool {
    TcpStream::connect(("localhost", port)).is_ok()
}
