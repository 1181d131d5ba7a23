//! TLS client side used when the relay originates TLS towards its remote

use log::debug;
use openssl::ssl::{Ssl, SslConnector, SslMethod, SslVerifyMode, SslVersion};

use crate::common::Result;

/// Build a connector that does not verify the peer
///
/// Minimum protocol is TLS 1.2 and every cipher suite is allowed.
pub fn insecure_connector() -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    builder.set_verify(SslVerifyMode::NONE);
    builder.set_min_proto_version(Some(SslVersion::TLS1_2))?;
    builder.set_cipher_list("ALL")?;
    Ok(builder.build())
}

/// Prepare a client `Ssl` for `host`, with SNI and without hostname verification
pub fn client_ssl(connector: &SslConnector, host: &str) -> Result<Ssl> {
    debug!("Preparing TLS client session for {}", host);
    let ssl = connector
        .configure()?
        .verify_hostname(false)
        .into_ssl(host)?;
    Ok(ssl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ssl() {
        let connector = insecure_connector().unwrap();
        assert!(client_ssl(&connector, "localhost").is_ok());
        assert!(client_ssl(&connector, "127.0.0.1").is_ok());
    }
}
