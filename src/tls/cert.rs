//! Certificate helpers
//!
//! Self-signed certificate generation for the relay listener and a couple of
//! inspection helpers used when logging the configured certificate.

use log::debug;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::SubjectAlternativeName;
use openssl::x509::{X509NameBuilder, X509};
use std::path::Path;

use crate::common::{read_file, Result};

/// Validity of generated certificates in days
const SELF_SIGNED_DAYS: u32 = 365;

/// Generate an RSA-2048 key and a self-signed certificate for `common_name`
pub fn generate_self_signed(common_name: &str) -> Result<(X509, PKey<Private>)> {
    let rsa = Rsa::generate(2048)?;
    let key = PKey::from_rsa(rsa)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", common_name)?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(127, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(SELF_SIGNED_DAYS)?;

    let mut builder = X509::builder()?;
    builder.set_version(2)?;
    builder.set_serial_number(&serial)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_pubkey(&key)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;

    let san = SubjectAlternativeName::new()
        .dns(common_name)
        .ip("127.0.0.1")
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(san)?;

    builder.sign(&key, MessageDigest::sha256())?;
    debug!("Generated self-signed certificate for {}", common_name);

    Ok((builder.build(), key))
}

/// Load a PEM certificate
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let pem = read_file(cert_path)?;
    Ok(X509::from_pem(&pem)?)
}

/// Subject of a PEM certificate, e.g. `CN=localhost`
pub fn get_cert_subject(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    Ok(subject_string(&cert))
}

/// SHA-256 fingerprint of a PEM certificate as colon separated hex
pub fn get_cert_fingerprint(cert_path: &Path) -> Result<String> {
    let cert = load_cert(cert_path)?;
    fingerprint(&cert)
}

fn subject_string(cert: &X509) -> String {
    cert.subject_name()
        .entries()
        .filter_map(|entry| {
            let key = entry.object().nid().short_name().ok()?;
            let value = entry.data().to_string().ok()?;
            Some(format!("{}={}", key, value))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn fingerprint(cert: &X509) -> Result<String> {
    let digest = cert.digest(MessageDigest::sha256())?;
    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_self_signed() {
        let (cert, key) = generate_self_signed("localhost").unwrap();
        assert_eq!(subject_string(&cert), "CN=localhost");
        assert!(cert.public_key().unwrap().public_eq(&key));
        assert_eq!(fingerprint(&cert).unwrap().split(':').count(), 32);
    }

    #[test]
    fn test_inspect_pem_file() {
        let (cert, _) = generate_self_signed("relay.test").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.crt");
        std::fs::write(&path, cert.to_pem().unwrap()).unwrap();

        assert_eq!(get_cert_subject(&path).unwrap(), "CN=relay.test");
        assert!(get_cert_fingerprint(&path).is_ok());
        assert!(get_cert_subject(&dir.path().join("missing.crt")).is_err());
    }
}
