// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::signature::approved_curve;
use crate::errors::Error;
use crate::store::{ITrustAnchorStore, TrustAnchor};
use openssl::x509::X509;
use x509_parser::prelude::*;

// ecdsa-with-SHA256, ecdsa-with-SHA384, ecdsa-with-SHA512
const ECDSA_SIGNATURE_OIDS: [&str; 3] = [
    "1.2.840.10045.4.3.2",
    "1.2.840.10045.4.3.3",
    "1.2.840.10045.4.3.4",
];

/// Outcome of a successful chain validation
#[derive(Debug, Clone)]
pub struct ValidatedChain {
    /// SHA-256 of the leaf certificate, lowercase hex
    pub leaf_fingerprint: String,

    /// The root the chain terminates in
    pub anchor: TrustAnchor,
}

/// Validate the chain `leaf` → `intermediates` → trust anchor at the given
/// reference time (seconds since the Unix epoch).
///
/// `intermediates` is ordered issuer-first: the first element must have
/// issued the leaf, the last must have been issued by a trusted root.  If the
/// document embeds its own copy of the root, it must be byte-for-byte equal
/// to the root in `anchors` that the chain terminates in.
pub fn validate_chain(
    leaf: &[u8],
    intermediates: &[Vec<u8>],
    root: Option<&[u8]>,
    anchors: &impl ITrustAnchorStore,
    reference_secs: i64,
) -> Result<ValidatedChain, Error> {
    if let Some(r) = root {
        if !anchors.contains(r) {
            return Err(Error::ChainBuildFailure(
                "embedded root is not a trusted root".to_string(),
            ));
        }
    }

    let mut chain = Vec::with_capacity(1 + intermediates.len());
    chain.push(parse_strict(leaf, "leaf")?);
    for (i, der) in intermediates.iter().enumerate() {
        chain.push(parse_strict(der, &cert_name(i + 1))?);
    }

    let top = chain.last().ok_or_else(|| Error::Internal("empty chain".to_string()))?;

    let anchor = anchors
        .lookup(top.tbs_certificate.issuer.as_raw())
        .ok_or_else(|| {
            Error::ChainBuildFailure(format!(
                "no trusted root for issuer {}",
                top.tbs_certificate.issuer
            ))
        })?;

    if let Some(r) = root {
        if anchor.der != r {
            return Err(Error::ChainBuildFailure(format!(
                "embedded root is not the root for issuer {}",
                top.tbs_certificate.issuer
            )));
        }
    }

    let anchor_cert = parse_strict(&anchor.der, "root")?;

    // validity first, so that an expired chain is reported as such whatever
    // else is wrong with it
    for (i, c) in chain.iter().enumerate() {
        ensure_validity(c, reference_secs, &cert_name(i))?;
    }
    ensure_validity(&anchor_cert, reference_secs, "root")?;

    ensure_leaf_usage(&chain[0])?;
    for (i, c) in chain.iter().enumerate().skip(1) {
        ensure_ca_usage(c, i - 1, &cert_name(i))?;
    }
    ensure_ca_usage(&anchor_cert, intermediates.len(), "root")?;

    // walk down from the anchor, each certificate verified with the key of
    // the one above it
    let mut parent_der: &[u8] = &anchor.der;
    let mut parent = &anchor_cert;

    let ders: Vec<&[u8]> = std::iter::once(leaf)
        .chain(intermediates.iter().map(|d| d.as_slice()))
        .collect();

    for i in (0..chain.len()).rev() {
        let name = cert_name(i);

        verify_issued_by(&chain[i], ders[i], parent, parent_der, &name)?;

        log::debug!("{name} ({}) verified", chain[i].subject());

        parent = &chain[i];
        parent_der = ders[i];
    }

    Ok(ValidatedChain {
        leaf_fingerprint: hex::encode(openssl::sha::sha256(leaf)),
        anchor: anchor.clone(),
    })
}

fn cert_name(position: usize) -> String {
    if position == 0 {
        "leaf".to_string()
    } else {
        format!("intermediate #{position}")
    }
}

fn parse_strict<'a>(der: &'a [u8], name: &str) -> Result<X509Certificate<'a>, Error> {
    let (rem, cert) = parse_x509_certificate(der)
        .map_err(|e| Error::MalformedDocument(format!("parsing {name} certificate: {e}")))?;

    if !rem.is_empty() {
        return Err(Error::MalformedDocument(format!(
            "{} trailing bytes after {name} certificate",
            rem.len()
        )));
    }

    Ok(cert)
}

fn ensure_validity(cert: &X509Certificate<'_>, now: i64, name: &str) -> Result<(), Error> {
    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();

    if now < not_before {
        return Err(Error::CertificateNotYetValid(format!(
            "{name} certificate not valid before {not_before} (reference time {now})"
        )));
    }

    if now > not_after {
        return Err(Error::CertificateExpired(format!(
            "{name} certificate not valid after {not_after} (reference time {now})"
        )));
    }

    Ok(())
}

fn ensure_leaf_usage(cert: &X509Certificate<'_>) -> Result<(), Error> {
    let bc = cert
        .basic_constraints()
        .map_err(|e| Error::MalformedDocument(format!("leaf basicConstraints: {e}")))?;

    if matches!(bc, Some(bc) if bc.value.ca) {
        return Err(Error::ChainBuildFailure(
            "leaf certificate is marked as CA".to_string(),
        ));
    }

    let ku = cert
        .key_usage()
        .map_err(|e| Error::MalformedDocument(format!("leaf keyUsage: {e}")))?;

    if let Some(ku) = ku {
        if ku.value.key_cert_sign() {
            return Err(Error::ChainBuildFailure(
                "leaf certificate has keyCertSign usage".to_string(),
            ));
        }

        if !ku.value.digital_signature() {
            return Err(Error::ChainBuildFailure(
                "leaf certificate lacks digitalSignature usage".to_string(),
            ));
        }
    }

    Ok(())
}

// `below` is the number of CA certificates between this one and the leaf
fn ensure_ca_usage(cert: &X509Certificate<'_>, below: usize, name: &str) -> Result<(), Error> {
    let bc = cert
        .basic_constraints()
        .map_err(|e| Error::MalformedDocument(format!("{name} basicConstraints: {e}")))?
        .ok_or_else(|| {
            Error::ChainBuildFailure(format!("{name} certificate lacks basicConstraints"))
        })?;

    if !bc.value.ca {
        return Err(Error::ChainBuildFailure(format!(
            "{name} certificate is not a CA"
        )));
    }

    if let Some(max) = bc.value.path_len_constraint {
        if below > max as usize {
            return Err(Error::ChainBuildFailure(format!(
                "{name} certificate allows {max} CAs below it, found {below}"
            )));
        }
    }

    let ku = cert
        .key_usage()
        .map_err(|e| Error::MalformedDocument(format!("{name} keyUsage: {e}")))?
        .ok_or_else(|| Error::ChainBuildFailure(format!("{name} certificate lacks keyUsage")))?;

    if !ku.value.key_cert_sign() {
        return Err(Error::ChainBuildFailure(format!(
            "{name} certificate lacks keyCertSign usage"
        )));
    }

    Ok(())
}

fn verify_issued_by(
    child: &X509Certificate<'_>,
    child_der: &[u8],
    parent: &X509Certificate<'_>,
    parent_der: &[u8],
    name: &str,
) -> Result<(), Error> {
    if child.tbs_certificate.issuer.as_raw() != parent.tbs_certificate.subject.as_raw() {
        return Err(Error::ChainBuildFailure(format!(
            "{name} certificate issued by {}, expected {}",
            child.tbs_certificate.issuer, parent.tbs_certificate.subject
        )));
    }

    let oid = child.signature_algorithm.algorithm.to_id_string();

    if !ECDSA_SIGNATURE_OIDS.contains(&oid.as_str()) {
        return Err(Error::UnsupportedAlgorithm(format!(
            "{name} certificate signature algorithm {oid}"
        )));
    }

    let parent_key = X509::from_der(parent_der)
        .and_then(|x| x.public_key())
        .map_err(|e| Error::MalformedDocument(format!("issuer of {name} certificate: {e}")))?;

    approved_curve(&parent_key)
        .map_err(|e| Error::UnsupportedAlgorithm(format!("issuer of {name} certificate: {e}")))?;

    let child_x509 = X509::from_der(child_der)
        .map_err(|e| Error::MalformedDocument(format!("{name} certificate: {e}")))?;

    match child_x509.verify(&parent_key) {
        Ok(true) => Ok(()),
        _ => Err(Error::SignatureInvalid(format!(
            "{name} certificate signature does not verify"
        ))),
    }
}
