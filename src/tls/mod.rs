//! TLS handling module
//!
//! Acceptors for the relay listener, the unverified client connector, and
//! certificate helpers.

mod acceptor;
mod cert;
mod connector;

pub use acceptor::{create_tls_acceptor, self_signed_acceptor};
pub use cert::{generate_self_signed, get_cert_fingerprint, get_cert_subject, load_cert};
pub use connector::{client_ssl, insecure_connector};
