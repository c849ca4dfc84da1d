// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::from_slice_strict;
use crate::errors::Error;
use ciborium::Value;

const COSE_SIGN1_TAG: u64 = 18;
const SIGNATURE1_CONTEXT: &str = "Signature1";

const HEADER_ALG_LABEL: i128 = 1;
const HEADER_CRIT_LABEL: i128 = 2;

/// ECDSA signature schemes accepted on COSE envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoseAlgorithm {
    ES256,
    ES384,
    ES512,
}

impl CoseAlgorithm {
    pub fn from_label(label: i128) -> Option<Self> {
        if label == cose::algs::ES256 as i128 {
            Some(CoseAlgorithm::ES256)
        } else if label == cose::algs::ES384 as i128 {
            Some(CoseAlgorithm::ES384)
        } else if label == cose::algs::ES512 as i128 {
            Some(CoseAlgorithm::ES512)
        } else {
            None
        }
    }
}

/// An undecorated COSE_Sign1 message: `[protected, unprotected, payload,
/// signature]`.
#[derive(Debug, Clone)]
pub struct CoseSign1 {
    /// Serialized protected header map, kept verbatim since it is covered by
    /// the signature
    pub protected: Vec<u8>,
    pub unprotected: Vec<(Value, Value)>,
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl CoseSign1 {
    /// Decode a (possibly tagged) COSE_Sign1 message.  The message must span
    /// the whole buffer.
    pub fn decode(buf: &[u8]) -> Result<CoseSign1, Error> {
        let v = from_slice_strict(buf).map_err(Error::MalformedEnvelope)?;

        let items = match v {
            Value::Array(a) => a,
            Value::Tag(COSE_SIGN1_TAG, inner) => match *inner {
                Value::Array(a) => a,
                _ => {
                    return Err(Error::MalformedEnvelope(
                        "tagged content MUST be array".to_string(),
                    ))
                }
            },
            Value::Tag(t, _) => {
                return Err(Error::MalformedEnvelope(format!(
                    "expecting tag {COSE_SIGN1_TAG}, got {t}"
                )))
            }
            _ => return Err(Error::MalformedEnvelope("expecting array type".to_string())),
        };

        let [protected, unprotected, payload, signature]: [Value; 4] =
            items.try_into().map_err(|a: Vec<Value>| {
                Error::MalformedEnvelope(format!("expecting 4 elements, got {}", a.len()))
            })?;

        Ok(CoseSign1 {
            protected: into_bstr(protected, "protected header")?,
            unprotected: match unprotected {
                Value::Map(m) => m,
                _ => {
                    return Err(Error::MalformedEnvelope(
                        "unprotected header MUST be map".to_string(),
                    ))
                }
            },
            payload: into_bstr(payload, "payload")?,
            signature: into_bstr(signature, "signature")?,
        })
    }

    /// Return the signature algorithm declared in the protected header
    pub fn algorithm(&self) -> Result<CoseAlgorithm, Error> {
        let header = self.protected_header()?;

        self.check_critical(&header)?;

        let alg = header
            .iter()
            .find(|(k, _)| label_of(k) == Some(HEADER_ALG_LABEL))
            .map(|(_, v)| v)
            .ok_or_else(|| {
                Error::MalformedEnvelope("alg header parameter not found".to_string())
            })?;

        let label: i128 = match alg {
            Value::Integer(i) => (*i).into(),
            _ => {
                return Err(Error::MalformedEnvelope(
                    "alg header parameter MUST be int".to_string(),
                ))
            }
        };

        CoseAlgorithm::from_label(label)
            .ok_or_else(|| Error::UnsupportedAlgorithm(format!("COSE algorithm {label}")))
    }

    /// Build the Sig_structure the signer computed the signature over:
    /// `["Signature1", protected, h'', payload]`
    pub fn sig_structure(&self) -> Result<Vec<u8>, Error> {
        sig_structure(&self.protected, &self.payload)
    }

    fn protected_header(&self) -> Result<Vec<(Value, Value)>, Error> {
        // a zero-length protected header stands for the empty map
        if self.protected.is_empty() {
            return Ok(Vec::new());
        }

        match from_slice_strict(&self.protected)
            .map_err(|e| Error::MalformedEnvelope(format!("protected header: {e}")))?
        {
            Value::Map(m) => Ok(m),
            _ => Err(Error::MalformedEnvelope(
                "protected header MUST be map".to_string(),
            )),
        }
    }

    // The only critical parameter we understand is alg.
    fn check_critical(&self, header: &[(Value, Value)]) -> Result<(), Error> {
        let crit = match header
            .iter()
            .find(|(k, _)| label_of(k) == Some(HEADER_CRIT_LABEL))
        {
            None => return Ok(()),
            Some((_, Value::Array(a))) => a,
            Some(_) => {
                return Err(Error::MalformedEnvelope(
                    "crit header parameter MUST be array".to_string(),
                ))
            }
        };

        for c in crit.iter() {
            match c {
                Value::Integer(i) if i128::from(*i) == HEADER_ALG_LABEL => continue,
                Value::Text(t) if t == "alg" => continue,
                other => {
                    return Err(Error::MalformedEnvelope(format!(
                        "unsupported critical header parameter {other:?}"
                    )))
                }
            }
        }

        Ok(())
    }
}

pub(crate) fn sig_structure(protected: &[u8], payload: &[u8]) -> Result<Vec<u8>, Error> {
    let tbs = Value::Array(vec![
        Value::Text(SIGNATURE1_CONTEXT.to_string()),
        Value::Bytes(protected.to_vec()),
        Value::Bytes(Vec::new()),
        Value::Bytes(payload.to_vec()),
    ]);

    let mut buf = Vec::new();

    ciborium::ser::into_writer(&tbs, &mut buf)
        .map_err(|e| Error::Internal(format!("encoding Sig_structure: {e}")))?;

    Ok(buf)
}

fn into_bstr(v: Value, n: &str) -> Result<Vec<u8>, Error> {
    match v {
        Value::Bytes(b) => Ok(b),
        _ => Err(Error::MalformedEnvelope(format!("{n} MUST be bstr"))),
    }
}

fn label_of(k: &Value) -> Option<i128> {
    match k {
        Value::Integer(i) => Some((*i).into()),
        _ => None,
    }
}
