//! HTTP convenience wrappers
//!
//! Thin wrappers over `reqwest` that log every request, retry connection
//! failures, skip certificate verification on the shared client, and turn
//! error statuses into [`UtilError::HttpStatus`] after printing the body.
//! [`blocking`] mirrors the async API for synchronous callers.

pub mod blocking;
mod transfer;

pub use transfer::{download, upload_multipart};

use log::{debug, warn};
use once_cell::sync::OnceCell;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

use crate::common::{Result, UtilError};

/// Connection retries of the async wrappers
pub const DEFAULT_ASYNC_RETRIES: u32 = 1;

/// Connection retries of the blocking wrappers
pub const DEFAULT_BLOCKING_RETRIES: u32 = 2;

static DEFAULT_CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared client that accepts any certificate
pub fn default_client() -> Result<Client> {
    DEFAULT_CLIENT
        .get_or_try_init(|| {
            Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
        })
        .cloned()
        .map_err(UtilError::from)
}

/// Per-request options
///
/// `C` is the client type, so the same options drive both the async and the
/// blocking wrappers.
#[derive(Debug, Clone)]
pub struct RequestOptions<C = Client> {
    /// Session to send through; the shared client when `None`
    pub client: Option<C>,
    /// Turn error statuses into errors
    pub check: bool,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub json: Option<Value>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    /// Connection retries; the flavor's default when `None`
    pub retries: Option<u32>,
}

impl<C> Default for RequestOptions<C> {
    fn default() -> Self {
        Self {
            client: None,
            check: true,
            headers: Vec::new(),
            query: Vec::new(),
            json: None,
            body: None,
            timeout: None,
            retries: None,
        }
    }
}

impl<C> RequestOptions<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client: C) -> Self {
        self.client = Some(client);
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, json: Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

fn apply_options<C>(mut builder: RequestBuilder, opts: &RequestOptions<C>) -> RequestBuilder {
    for (name, value) in &opts.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if !opts.query.is_empty() {
        builder = builder.query(&opts.query);
    }
    if let Some(json) = &opts.json {
        builder = builder.json(json);
    }
    if let Some(body) = &opts.body {
        builder = builder.body(body.clone());
    }
    if let Some(timeout) = opts.timeout {
        builder = builder.timeout(timeout);
    }
    builder
}

/// Send a request with the given method
pub async fn request(method: Method, url: &str, opts: &RequestOptions) -> Result<Response> {
    let client = match &opts.client {
        Some(client) => client.clone(),
        None => default_client()?,
    };
    let retries = opts.retries.unwrap_or(DEFAULT_ASYNC_RETRIES);

    debug!("{} {}", method, url);
    let mut attempt = 0;
    let response = loop {
        let builder = apply_options(client.request(method.clone(), url), opts);
        match builder.send().await {
            Ok(response) => break response,
            Err(e) if e.is_connect() && attempt < retries => {
                attempt += 1;
                warn!("{} {} failed to connect, retry {}/{}: {}", method, url, attempt, retries, e);
            }
            Err(e) => return Err(e.into()),
        }
    };

    if opts.check {
        check_http_response(response).await
    } else {
        Ok(response)
    }
}

pub async fn get(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::GET, url, opts).await
}

pub async fn post(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::POST, url, opts).await
}

pub async fn put(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::PUT, url, opts).await
}

pub async fn delete(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::DELETE, url, opts).await
}

pub async fn patch(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::PATCH, url, opts).await
}

/// Pass successful responses through, report and fail on error statuses
///
/// The body of a failed response is printed to stderr, pretty-printed when
/// it is JSON.
pub async fn check_http_response(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let is_json = is_json_response(response.headers());
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), url, body, is_json))
}

fn is_json_response(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false)
}

fn status_error(status: u16, url: String, body: String, is_json: bool) -> UtilError {
    let pretty = if is_json {
        serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
    } else {
        None
    };
    match pretty {
        Some(pretty) => eprintln!("{}", pretty),
        None if !body.is_empty() => eprintln!("{}", body),
        None => {}
    }
    UtilError::HttpStatus { status, url, body }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    /// Serve `count` connections with a canned response on a local port
    pub fn serve_canned(status: &str, content_type: &str, body: &[u8], count: usize) -> SocketAddr {
        serve_recording(status, content_type, body, count).0
    }

    /// Like `serve_canned`, also handing back each raw request it read
    pub fn serve_recording(
        status: &str,
        content_type: &str,
        body: &[u8],
        count: usize,
    ) -> (SocketAddr, mpsc::Receiver<Vec<u8>>) {
        let (requests, received) = mpsc::channel();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            content_type,
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);

        thread::spawn(move || {
            for stream in listener.incoming().take(count) {
                let mut stream = stream.unwrap();
                let request = read_request(&mut stream);
                let _ = stream.write_all(&response);
                let _ = requests.send(request);
            }
        });
        (addr, received)
    }

    /// Consume one request so closing the socket does not reset the client
    fn read_request(stream: &mut TcpStream) -> Vec<u8> {
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return request,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
            if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();
        let chunked = head.contains("transfer-encoding: chunked");
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        loop {
            let body = &request[header_end..];
            let done = if chunked {
                body.ends_with(b"0\r\n\r\n")
            } else {
                body.len() >= length
            };
            if done {
                return request;
            }
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => return request,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
    }

    /// A local port nothing listens on
    pub fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }
}
