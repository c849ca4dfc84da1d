// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use openssl::bn::BigNumContext;
use openssl::ec::PointConversionForm;
use openssl::pkey::PKey;

/// Size of a freshly generated nonce, in bytes
pub const NONCE_LEN: usize = 20;

/// decodes bytes from a base64-encoded string.  Whitespace, including `\n`
/// escapes left over from JSON copy-and-paste, is ignored, as is padding.
pub fn decode_base64(v: &str) -> Result<Vec<u8>, Error> {
    let cleaned: String = v.replace("\\n", "").split_whitespace().collect();

    if cleaned.is_empty() {
        return Err(Error::MalformedInput("empty base64 input".to_string()));
    }

    let engine = GeneralPurpose::new(
        &alphabet::STANDARD,
        GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
    );

    engine
        .decode(cleaned)
        .map_err(|e| Error::MalformedInput(format!("base64: {e}")))
}

/// decodes bytes from a hex string, ignoring case, whitespace and a leading
/// `0x`
pub fn decode_hex(v: &str) -> Result<Vec<u8>, Error> {
    let cleaned: String = v.split_whitespace().collect();

    let digits = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
        .unwrap_or(&cleaned);

    if digits.is_empty() {
        return Err(Error::MalformedInput("empty hex input".to_string()));
    }

    hex::decode(digits).map_err(|e| Error::MalformedInput(format!("hex: {e}")))
}

/// Returns a fresh random nonce as 40 lowercase hex characters
pub fn generate_nonce() -> Result<String, Error> {
    let mut buf = [0u8; NONCE_LEN];

    openssl::rand::rand_bytes(&mut buf)
        .map_err(|e| Error::Internal(format!("generating nonce: {e}")))?;

    Ok(hex::encode(buf))
}

/// Convert a PEM encoded EC public key into the hex encoding of its
/// uncompressed point (`04 || x || y`)
pub fn pem_to_raw_hex(pem: &str) -> Result<String, Error> {
    let pkey = PKey::public_key_from_pem(pem.trim().as_bytes())
        .map_err(|e| Error::MalformedInput(format!("parsing public key PEM: {e}")))?;

    let ec = pkey
        .ec_key()
        .map_err(|_| Error::UnsupportedAlgorithm("only EC public keys are supported".to_string()))?;

    let mut ctx = BigNumContext::new().map_err(|e| Error::Internal(e.to_string()))?;

    let raw = ec
        .public_key()
        .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
        .map_err(|e| Error::Internal(format!("encoding EC point: {e}")))?;

    Ok(hex::encode(raw))
}
