// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use ciborium::Value;
use std::fmt;
use std::io::Cursor;

/// Hash algorithm used to compute the measurement registers, as named by the
/// `digest` field of the attestation document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SHA256" => Some(DigestAlgorithm::Sha256),
            "SHA384" => Some(DigestAlgorithm::Sha384),
            "SHA512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Size in bytes of a register computed with this algorithm
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DigestAlgorithm::Sha256 => "SHA256",
            DigestAlgorithm::Sha384 => "SHA384",
            DigestAlgorithm::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

/// Decode exactly one CBOR item from `buf`.  Any byte left over after the
/// item is an error.
pub(crate) fn from_slice_strict(buf: &[u8]) -> Result<Value, String> {
    let mut reader = Cursor::new(buf);

    let v: Value = ciborium::de::from_reader(&mut reader).map_err(|e| e.to_string())?;

    if reader.position() != buf.len() as u64 {
        return Err(format!(
            "{} trailing byte(s) after CBOR item",
            buf.len() as u64 - reader.position()
        ));
    }

    Ok(v)
}

pub(crate) fn to_bstr(v: &Value, n: &str) -> Result<Vec<u8>, Error> {
    match v {
        Value::Bytes(b) => Ok(b.clone()),
        _ => Err(Error::MalformedDocument(format!("{n} MUST be bstr"))),
    }
}

pub(crate) fn to_opt_bstr(v: &Value, n: &str) -> Result<Option<Vec<u8>>, Error> {
    match v {
        Value::Null => Ok(None),
        Value::Bytes(b) => Ok(Some(b.clone())),
        _ => Err(Error::MalformedDocument(format!("{n} MUST be bstr or nil"))),
    }
}

pub(crate) fn to_tstr(v: &Value, n: &str) -> Result<String, Error> {
    match v {
        Value::Text(s) => Ok(s.clone()),
        _ => Err(Error::MalformedDocument(format!("{n} MUST be tstr"))),
    }
}

pub(crate) fn to_uint(v: &Value, n: &str) -> Result<u64, Error> {
    match v {
        Value::Integer(i) => u64::try_from(*i)
            .map_err(|_| Error::MalformedDocument(format!("{n} MUST be uint"))),
        _ => Err(Error::MalformedDocument(format!("{n} MUST be uint"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn digest_names() {
        assert_eq!(
            DigestAlgorithm::from_name("SHA384"),
            Some(DigestAlgorithm::Sha384)
        );
        assert_eq!(DigestAlgorithm::from_name("sha384"), None);
        assert_eq!(DigestAlgorithm::from_name("SHA1"), None);

        assert_eq!(DigestAlgorithm::Sha256.output_len(), 32);
        assert_eq!(DigestAlgorithm::Sha384.output_len(), 48);
        assert_eq!(DigestAlgorithm::Sha512.output_len(), 64);
        assert_eq!(DigestAlgorithm::Sha384.to_string(), "SHA384");
    }

    #[test]
    fn strict_rejects_trailing_bytes() {
        // bstr 'abc' followed by a stray 0x00
        let buf = hex!("43616263 00");

        assert!(from_slice_strict(&buf[..4]).is_ok());
        assert!(from_slice_strict(&buf).is_err());
    }

    #[test]
    fn uint_rejects_negative() {
        let v = Value::Integer((-1).into());

        assert!(to_uint(&v, "timestamp").is_err());
        assert_eq!(to_uint(&Value::Integer(7.into()), "timestamp"), Ok(7));
    }
}
