// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use crate::token::{sig_structure, CoseAlgorithm};
use openssl::bn::BigNum;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Public};
use openssl::x509::X509;

/// Extract the public key of the leaf certificate.  Only EC keys are
/// accepted.
pub fn leaf_public_key(der: &[u8]) -> Result<PKey<Public>, Error> {
    let x = X509::from_der(der)
        .map_err(|e| Error::MalformedDocument(format!("parsing leaf certificate: {e}")))?;

    let pkey = x
        .public_key()
        .map_err(|e| Error::MalformedDocument(format!("leaf public key: {e}")))?;

    approved_curve(&pkey).map_err(|e| Error::UnsupportedAlgorithm(format!("leaf key: {e}")))?;

    Ok(pkey)
}

/// Verify the COSE_Sign1 `signature` over `protected` and `payload` using the
/// leaf key.  The key must sit on the curve the header algorithm calls for.
pub fn verify_signature(
    protected: &[u8],
    payload: &[u8],
    signature: &[u8],
    key: &PKeyRef<Public>,
    alg: CoseAlgorithm,
) -> Result<(), Error> {
    let curve =
        approved_curve(key).map_err(|e| Error::UnsupportedAlgorithm(format!("leaf key: {e}")))?;

    let (expected_curve, md, sig_len) = parameters(alg);

    if curve != expected_curve {
        return Err(Error::AlgorithmMismatch(format!(
            "{alg:?} requires {}, leaf key is on {}",
            curve_name(expected_curve),
            curve_name(curve)
        )));
    }

    if signature.len() != sig_len {
        return Err(Error::SignatureInvalid(format!(
            "{alg:?} signature is {sig_len} bytes, got {}",
            signature.len()
        )));
    }

    let tbs = sig_structure(protected, payload)?;

    let hash =
        openssl::hash::hash(md, &tbs).map_err(|e| Error::Internal(format!("hashing: {e}")))?;

    let half = sig_len / 2;

    let r = BigNum::from_slice(&signature[..half])
        .map_err(|e| Error::Internal(format!("signature r: {e}")))?;
    let s = BigNum::from_slice(&signature[half..])
        .map_err(|e| Error::Internal(format!("signature s: {e}")))?;

    let sig = EcdsaSig::from_private_components(r, s)
        .map_err(|e| Error::Internal(format!("building ECDSA signature: {e}")))?;

    let ec_key = key
        .ec_key()
        .map_err(|e| Error::UnsupportedAlgorithm(format!("leaf key: {e}")))?;

    match sig.verify(&hash, &ec_key) {
        Ok(true) => Ok(()),
        _ => Err(Error::SignatureInvalid(
            "COSE_Sign1 signature does not verify".to_string(),
        )),
    }
}

/// Return the named curve of an EC key, failing for non-EC keys and for
/// curves other than P-256, P-384 and P-521
pub(crate) fn approved_curve<T: HasPublic>(key: &PKeyRef<T>) -> Result<Nid, String> {
    let ec = key
        .ec_key()
        .map_err(|_| "only EC keys are supported".to_string())?;

    let nid = ec
        .group()
        .curve_name()
        .ok_or_else(|| "EC key has no named curve".to_string())?;

    match nid {
        Nid::X9_62_PRIME256V1 | Nid::SECP384R1 | Nid::SECP521R1 => Ok(nid),
        other => Err(format!("curve {} is not supported", curve_name(other))),
    }
}

fn parameters(alg: CoseAlgorithm) -> (Nid, MessageDigest, usize) {
    match alg {
        CoseAlgorithm::ES256 => (Nid::X9_62_PRIME256V1, MessageDigest::sha256(), 64),
        CoseAlgorithm::ES384 => (Nid::SECP384R1, MessageDigest::sha384(), 96),
        CoseAlgorithm::ES512 => (Nid::SECP521R1, MessageDigest::sha512(), 132),
    }
}

fn curve_name(nid: Nid) -> String {
    nid.short_name()
        .map(|s| s.to_string())
        .unwrap_or_else(|_| format!("{nid:?}"))
}
