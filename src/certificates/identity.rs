use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use rustls::RootCertStore;
use x509_parser::prelude::*;

use super::error::{CertificateError, Result};
use crate::vault::{PkiData, SecretString};

/// One complete TLS identity: leaf + issuing CA chain, private key and the
/// CA bundle that issued it.
///
/// Values are immutable. Rotation replaces the whole `Arc<TlsIdentity>`,
/// so a handshake holding one can never see a certificate paired with
/// another identity's key.
pub struct TlsIdentity {
    certified_key: Arc<CertifiedKey>,
    chain_pem: String,
    ca_certificates: Vec<CertificateDer<'static>>,
    serial_number: String,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity")
            .field("subject", &self.subject)
            .field("serial_number", &self.serial_number)
            .field("not_after", &self.not_after)
            .field("chain", &format!("[{} bytes PEM]", self.chain_pem.len()))
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

impl TlsIdentity {
    /// Build an identity from an issuance response.
    pub fn from_issued(data: &PkiData) -> Result<Self> {
        Self::from_pem(&data.certificate, &data.issuing_ca, &data.private_key)
    }

    /// Build an identity from PEM material. The chain handed to TLS is the
    /// leaf followed by the issuing CA.
    pub fn from_pem(certificate: &str, issuing_ca: &str, private_key: &SecretString) -> Result<Self> {
        let chain_pem = format!("{}\n{}", certificate.trim_end(), issuing_ca);

        let chain = parse_certificates(chain_pem.as_bytes(), "certificate chain")?;
        let ca_certificates = parse_certificates(issuing_ca.as_bytes(), "issuing CA")?;

        let key_der = PrivateKeyDer::from_pem_slice(private_key.expose_secret().as_bytes())
            .map_err(|err| CertificateError::InvalidPrivateKey { source: anyhow!(err) })?;
        let signing_key = rustls::crypto::ring::sign::any_supported_type(&key_der)
            .map_err(|err| CertificateError::InvalidPrivateKey { source: anyhow!(err) })?;

        let metadata = LeafMetadata::parse(&chain[0])?;

        Ok(Self {
            certified_key: Arc::new(CertifiedKey::new(chain, signing_key)),
            chain_pem,
            ca_certificates,
            serial_number: metadata.serial_number,
            subject: metadata.subject,
            not_before: metadata.not_before,
            not_after: metadata.not_after,
        })
    }

    /// The certificate chain and signing key in the form rustls resolvers return.
    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        Arc::clone(&self.certified_key)
    }

    /// Leaf then issuing CA, PEM encoded.
    pub fn chain_pem(&self) -> &str {
        &self.chain_pem
    }

    /// Serial number formatted as colon-separated hex, as the backend reports it.
    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    /// Trust anchors built from the issuing CA bundle.
    pub fn ca_root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        for cert in &self.ca_certificates {
            roots.add(cert.clone())?;
        }
        Ok(roots)
    }
}

fn parse_certificates(pem: &[u8], what: &'static str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| CertificateError::InvalidCertificatePem { what, source: anyhow!(err) })?;

    if certs.is_empty() {
        return Err(CertificateError::EmptyCertificateChain { what });
    }
    Ok(certs)
}

struct LeafMetadata {
    serial_number: String,
    subject: String,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
}

impl LeafMetadata {
    fn parse(leaf: &CertificateDer<'_>) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(leaf.as_ref())
            .map_err(|err| CertificateError::CertificateMetadata { source: anyhow!(err) })?;

        let validity = cert.validity();
        Ok(Self {
            serial_number: cert.raw_serial_as_string(),
            subject: cert.subject().to_string(),
            not_before: asn1_to_chrono(validity.not_before)?,
            not_after: asn1_to_chrono(validity.not_after)?,
        })
    }
}

fn asn1_to_chrono(time: ASN1Time) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0).single().ok_or_else(|| {
        CertificateError::CertificateMetadata {
            source: anyhow!("certificate time {} out of range", time.timestamp()),
        }
    })
}
