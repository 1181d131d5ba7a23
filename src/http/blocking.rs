//! Blocking flavor of the HTTP wrappers
//!
//! Must not be called from inside an async runtime.

use log::{debug, warn};
use once_cell::sync::OnceCell;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Method;

use super::{is_json_response, status_error, DEFAULT_BLOCKING_RETRIES};
use crate::common::{Result, UtilError};

pub type RequestOptions = super::RequestOptions<Client>;

static DEFAULT_CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared blocking client that accepts any certificate
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

fn apply_options(mut builder: RequestBuilder, opts: &RequestOptions) -> RequestBuilder {
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

pub fn request(method: Method, url: &str, opts: &RequestOptions) -> Result<Response> {
    let client = match &opts.client {
        Some(client) => client.clone(),
        None => default_client()?,
    };
    let retries = opts.retries.unwrap_or(DEFAULT_BLOCKING_RETRIES);

    debug!("{} {}", method, url);
    let mut attempt = 0;
    let response = loop {
        let builder = apply_options(client.request(method.clone(), url), opts);
        match builder.send() {
            Ok(response) => break response,
            Err(e) if e.is_connect() && attempt < retries => {
                attempt += 1;
                warn!("{} {} failed to connect, retry {}/{}: {}", method, url, attempt, retries, e);
            }
            Err(e) => return Err(e.into()),
        }
    };

    if opts.check {
        check_http_response(response)
    } else {
        Ok(response)
    }
}

pub fn get(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::GET, url, opts)
}

pub fn post(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::POST, url, opts)
}

pub fn put(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::PUT, url, opts)
}

pub fn delete(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::DELETE, url, opts)
}

pub fn patch(url: &str, opts: &RequestOptions) -> Result<Response> {
    request(Method::PATCH, url, opts)
}

/// Blocking counterpart of [`super::check_http_response`]
pub fn check_http_response(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let is_json = is_json_response(response.headers());
    let body = response.text().unwrap_or_default();
    Err(status_error(status.as_u16(), url, body, is_json))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{closed_port, serve_canned};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_blocking_put_json() {
        let addr = serve_canned("201 Created", "application/json", br#"{"id":1}"#, 1);
        let opts = RequestOptions::new()
            .json(json!({"name": "x"}))
            .header("X-Trace", "abc");
        let response = put(&format!("http://{}/items", addr), &opts).unwrap();
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn test_blocking_error_status() {
        let addr = serve_canned("403 Forbidden", "text/plain", b"denied", 1);
        let err = delete(&format!("http://{}/", addr), &RequestOptions::new()).unwrap_err();
        assert!(matches!(err, UtilError::HttpStatus { status: 403, .. }));
    }

    #[test]
    fn test_blocking_connection_refused() {
        let url = format!("http://127.0.0.1:{}/", closed_port());
        assert!(get(&url, &RequestOptions::new().retries(0)).is_err());
    }
}
