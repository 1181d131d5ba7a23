//! TLS acceptor creation for the relay listener

use log::info;
use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod, SslVerifyMode};
use std::path::Path;

use super::cert::generate_self_signed;
use crate::common::Result;

/// Create a TLS acceptor from PEM certificate and key files
///
/// Client certificates are not requested.
///
/// # Example
///
/// ```no_run
/// # use std::path::Path;
/// # use utilkit::tls::create_tls_acceptor;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let acceptor = create_tls_acceptor(
///     Path::new("certs/server.crt"),
///     Path::new("certs/server.key"),
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(cert_path: &Path, key_path: &Path) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    acceptor.set_certificate_chain_file(cert_path)?;
    acceptor.set_private_key_file(key_path, SslFiletype::PEM)?;
    acceptor.check_private_key()?;
    acceptor.set_verify(SslVerifyMode::NONE);

    info!("Loaded server certificate {}", cert_path.display());
    Ok(acceptor.build())
}

/// Create a TLS acceptor backed by a freshly generated self-signed certificate
pub fn self_signed_acceptor(common_name: &str) -> Result<SslAcceptor> {
    let (cert, key) = generate_self_signed(common_name)?;

    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;
    acceptor.set_certificate(&cert)?;
    acceptor.set_private_key(&key)?;
    acceptor.check_private_key()?;
    acceptor.set_verify(SslVerifyMode::NONE);

    info!("Using self-signed certificate for {}", common_name);
    Ok(acceptor.build())
}
