// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Builders for attestation documents signed with the test CA hierarchy in
//! `testdata/`.

use crate::token::{sig_structure, CoseAlgorithm};
use ciborium::Value;
use openssl::ec::EcKey;
use openssl::ecdsa::EcdsaSig;
use openssl::hash::MessageDigest;
use std::collections::BTreeMap;

pub const TEST_ROOT_DER: &[u8] = include_bytes!("../../testdata/root.der");
pub const TEST_INTERMEDIATE_DER: &[u8] = include_bytes!("../../testdata/intermediate.der");
pub const TEST_LEAF_DER: &[u8] = include_bytes!("../../testdata/leaf.der");
pub const TEST_LEAF_KEY_PEM: &str = include_str!("../../testdata/leaf.key.pem");
pub const TEST_LEAF_P256_DER: &[u8] = include_bytes!("../../testdata/leaf-p256.der");
pub const TEST_LEAF_P256_KEY_PEM: &str = include_str!("../../testdata/leaf-p256.key.pem");

/// 2024-06-01T01:00:00Z, inside the validity window of every test certificate
pub const TEST_TIME_SECS: u64 = 1717203600;

/// Sign the Sig_structure of `protected` and `payload`, returning the raw
/// `r || s` encoding used by COSE
pub fn sign_raw(key_pem: &str, alg: CoseAlgorithm, protected: &[u8], payload: &[u8]) -> Vec<u8> {
    let key = EcKey::private_key_from_pem(key_pem.as_bytes()).unwrap();

    let (md, half) = match alg {
        CoseAlgorithm::ES256 => (MessageDigest::sha256(), 32),
        CoseAlgorithm::ES384 => (MessageDigest::sha384(), 48),
        CoseAlgorithm::ES512 => (MessageDigest::sha512(), 66),
    };

    let tbs = sig_structure(protected, payload).unwrap();
    let hash = openssl::hash::hash(md, &tbs).unwrap();
    let sig = EcdsaSig::sign(&hash, &key).unwrap();

    let mut raw = sig.r().to_vec_padded(half).unwrap();
    raw.extend(sig.s().to_vec_padded(half).unwrap());
    raw
}

/// Protected header `{1: alg}` for the given algorithm
pub fn protected_header(alg: CoseAlgorithm) -> Vec<u8> {
    let label = match alg {
        CoseAlgorithm::ES256 => cose::algs::ES256,
        CoseAlgorithm::ES384 => cose::algs::ES384,
        CoseAlgorithm::ES512 => cose::algs::ES512,
    };

    to_cbor(&Value::Map(vec![(
        Value::Integer(1.into()),
        Value::Integer(label.into()),
    )]))
}

pub fn to_cbor(v: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(v, &mut buf).unwrap();
    buf
}

/// An attestation document under construction.  Defaults describe a valid
/// SHA384 document issued by the test leaf at [`TEST_TIME_SECS`].
#[derive(Clone, Debug)]
pub struct DocumentBuilder {
    pub module_id: String,
    pub digest: String,
    pub timestamp_ms: u64,
    pub pcrs: BTreeMap<u16, Vec<u8>>,
    pub certificate: Vec<u8>,
    pub cabundle: Vec<Vec<u8>>,
    pub public_key: Option<Vec<u8>>,
    pub user_data: Option<Vec<u8>>,
    pub nonce: Option<Vec<u8>>,
    pub alg: CoseAlgorithm,
    pub key_pem: String,
    pub tagged: bool,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self {
            module_id: "i-0123456789abcdef0-enc0123456789abcdef".to_string(),
            digest: "SHA384".to_string(),
            timestamp_ms: TEST_TIME_SECS * 1000,
            pcrs: (0u16..5).map(|i| (i, vec![i as u8; 48])).collect(),
            certificate: TEST_LEAF_DER.to_vec(),
            cabundle: vec![TEST_ROOT_DER.to_vec(), TEST_INTERMEDIATE_DER.to_vec()],
            public_key: None,
            user_data: None,
            nonce: Some(vec![0u8; 20]),
            alg: CoseAlgorithm::ES384,
            key_pem: TEST_LEAF_KEY_PEM.to_string(),
            tagged: true,
        }
    }
}

impl DocumentBuilder {
    /// The CBOR attestation document, i.e. the COSE payload
    pub fn payload(&self) -> Vec<u8> {
        let opt = |v: &Option<Vec<u8>>| match v {
            Some(b) => Value::Bytes(b.clone()),
            None => Value::Null,
        };

        let doc = Value::Map(vec![
            (
                Value::Text("module_id".to_string()),
                Value::Text(self.module_id.clone()),
            ),
            (
                Value::Text("digest".to_string()),
                Value::Text(self.digest.clone()),
            ),
            (
                Value::Text("timestamp".to_string()),
                Value::Integer(self.timestamp_ms.into()),
            ),
            (
                Value::Text("pcrs".to_string()),
                Value::Map(
                    self.pcrs
                        .iter()
                        .map(|(k, v)| (Value::Integer((*k).into()), Value::Bytes(v.clone())))
                        .collect(),
                ),
            ),
            (
                Value::Text("certificate".to_string()),
                Value::Bytes(self.certificate.clone()),
            ),
            (
                Value::Text("cabundle".to_string()),
                Value::Array(
                    self.cabundle
                        .iter()
                        .map(|c| Value::Bytes(c.clone()))
                        .collect(),
                ),
            ),
            (Value::Text("public_key".to_string()), opt(&self.public_key)),
            (Value::Text("user_data".to_string()), opt(&self.user_data)),
            (Value::Text("nonce".to_string()), opt(&self.nonce)),
        ]);

        to_cbor(&doc)
    }

    /// The signed COSE_Sign1 envelope
    pub fn build(&self) -> Vec<u8> {
        let protected = protected_header(self.alg);
        let payload = self.payload();
        let signature = sign_raw(&self.key_pem, self.alg, &protected, &payload);

        let sign1 = Value::Array(vec![
            Value::Bytes(protected),
            Value::Map(Vec::new()),
            Value::Bytes(payload),
            Value::Bytes(signature),
        ]);

        if self.tagged {
            to_cbor(&Value::Tag(18, Box::new(sign1)))
        } else {
            to_cbor(&sign1)
        }
    }
}
