// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use openssl::hash::MessageDigest;
use openssl::x509::X509;
use x509_parser::prelude::*;

/// AWS Nitro Enclaves Root CA (G1)
///
/// Subject: C=US, O=Amazon, OU=AWS, CN=aws.nitro-enclaves
/// Valid: 2019-10-28 to 2049-10-28
///
/// See <https://docs.aws.amazon.com/enclaves/latest/user/verify-root.html>
pub const AWS_NITRO_ENCLAVES_ROOT_G1: &str =
    include_str!("../../certs/AWS_NitroEnclaves_Root-G1.pem");

/// A root certificate unconditionally trusted as the origin of attestation
/// certificate chains.
#[derive(Clone, Debug)]
pub struct TrustAnchor {
    /// The DER encoded certificate
    pub der: Vec<u8>,

    /// The DER encoded subject name, used to match issuers
    pub subject_raw: Vec<u8>,

    /// Human readable subject, for diagnostics
    pub subject: String,

    /// SHA-256 of the DER certificate, lowercase hex
    pub fingerprint: String,
}

impl TrustAnchor {
    /// Build a trust anchor from a PEM encoded root certificate.  The
    /// certificate must be a self-signed CA.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let x = X509::from_pem(pem.as_bytes())
            .map_err(|e| Error::Internal(format!("parsing root PEM: {e}")))?;

        let der = x
            .to_der()
            .map_err(|e| Error::Internal(format!("encoding root DER: {e}")))?;

        Self::from_der(&der)
    }

    pub fn from_der(der: &[u8]) -> Result<Self, Error> {
        let (rem, cert) = parse_x509_certificate(der)
            .map_err(|e| Error::Internal(format!("parsing root certificate: {e}")))?;

        if !rem.is_empty() {
            return Err(Error::Internal(
                "trailing bytes after root certificate".to_string(),
            ));
        }

        if cert.tbs_certificate.subject.as_raw() != cert.tbs_certificate.issuer.as_raw() {
            return Err(Error::Internal("root certificate is not self-issued".to_string()));
        }

        if !cert.is_ca() {
            return Err(Error::Internal("root certificate is not a CA".to_string()));
        }

        let x = X509::from_der(der)
            .map_err(|e| Error::Internal(format!("parsing root certificate: {e}")))?;

        let pkey = x
            .public_key()
            .map_err(|e| Error::Internal(format!("root public key: {e}")))?;

        if !x.verify(&pkey).unwrap_or(false) {
            return Err(Error::Internal(
                "root certificate self-signature does not verify".to_string(),
            ));
        }

        let fp = x
            .digest(MessageDigest::sha256())
            .map_err(|e| Error::Internal(format!("root fingerprint: {e}")))?;

        Ok(Self {
            der: der.to_vec(),
            subject_raw: cert.tbs_certificate.subject.as_raw().to_vec(),
            subject: cert.subject().to_string(),
            fingerprint: hex::encode(fp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ROOT_PEM: &str = include_str!("../../testdata/root.pem");
    const TEST_ROOT_DER: &[u8] = include_bytes!("../../testdata/root.der");
    const TEST_INTERMEDIATE_DER: &[u8] = include_bytes!("../../testdata/intermediate.der");

    #[test]
    fn nitro_root_ok() {
        let ta = TrustAnchor::from_pem(AWS_NITRO_ENCLAVES_ROOT_G1).expect("loading Nitro root");

        assert!(
            ta.subject.contains("aws.nitro-enclaves"),
            "unexpected subject {}",
            ta.subject
        );
        assert!(ta.subject.contains("Amazon"));
        assert_eq!(
            ta.fingerprint,
            "641a0321a3e244efe456463195d606317ed7cdcc3c1756e09893f3c68f79bb5b"
        );
    }

    #[test]
    fn pem_and_der_agree() {
        let a = TrustAnchor::from_pem(TEST_ROOT_PEM).expect("loading test root PEM");
        let b = TrustAnchor::from_der(TEST_ROOT_DER).expect("loading test root DER");

        assert_eq!(a.der, b.der);
        assert_eq!(a.subject_raw, b.subject_raw);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn intermediate_is_not_an_anchor() {
        assert!(TrustAnchor::from_der(TEST_INTERMEDIATE_DER).is_err());
    }

    #[test]
    fn rubbish_is_not_an_anchor() {
        assert!(TrustAnchor::from_pem("not a certificate").is_err());
        assert!(TrustAnchor::from_der(&[0x30, 0x03, 0x02, 0x01, 0x00]).is_err());
    }
}
