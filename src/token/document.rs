// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::common::*;
use crate::errors::Error;
use bitmask::*;
use ciborium::Value;
use std::collections::BTreeMap;

const MODULE_ID_LABEL: &str = "module_id";
const DIGEST_LABEL: &str = "digest";
const TIMESTAMP_LABEL: &str = "timestamp";
const PCRS_LABEL: &str = "pcrs";
const CERTIFICATE_LABEL: &str = "certificate";
const CABUNDLE_LABEL: &str = "cabundle";
const PUBLIC_KEY_LABEL: &str = "public_key";
const USER_DATA_LABEL: &str = "user_data";
const NONCE_LABEL: &str = "nonce";

const MAX_PCRS: u64 = 32;

bitmask! {
    #[derive(Debug)]
    mask FieldsSet: u16 where flags Fields {
        ModuleId    = 0x01,
        Digest      = 0x02,
        Timestamp   = 0x04,
        Pcrs        = 0x08,
        Certificate = 0x10,
        CaBundle    = 0x20,
        PublicKey   = 0x40,
        UserData    = 0x80,
        Nonce       = 0x100,
    }
}

/// The attestation document carried as payload of the COSE_Sign1 envelope.
///
/// For the syntax of the fields see §3.2 of the AWS Nitro Enclaves
/// attestation process documentation.
#[derive(Debug)]
pub struct AttestationDocument {
    pub module_id: String,              // text, non-empty
    pub digest: DigestAlgorithm,        // text, "SHA256" / "SHA384" / "SHA512"
    pub timestamp: u64,                 // uint, ms since the Unix epoch
    pub pcrs: BTreeMap<u16, Vec<u8>>,   // { 0..31 => bytes .size digest }
    pub certificate: Vec<u8>,           // bytes, DER leaf
    pub cabundle: Vec<Vec<u8>>,         // [ root, intermediate, ... ]
    pub public_key: Option<Vec<u8>>,    // bytes / nil
    pub user_data: Option<Vec<u8>>,     // bytes / nil
    pub nonce: Option<Vec<u8>>,         // bytes / nil

    fields_set: FieldsSet,
}

impl Default for AttestationDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl AttestationDocument {
    pub fn new() -> Self {
        Self {
            module_id: String::from(""),
            digest: DigestAlgorithm::Sha384,
            timestamp: 0,
            pcrs: Default::default(),
            certificate: Default::default(),
            cabundle: Default::default(),
            public_key: None,
            user_data: None,
            nonce: None,
            fields_set: FieldsSet::none(),
        }
    }

    /// Decode a CBOR encoded attestation document.  The document must span
    /// the whole buffer.
    pub fn decode(buf: &[u8]) -> Result<AttestationDocument, Error> {
        let v = from_slice_strict(buf).map_err(Error::MalformedDocument)?;

        let mut doc: AttestationDocument = Default::default();

        if let Value::Map(contents) = v {
            doc.parse(contents)?;
        } else {
            return Err(Error::MalformedDocument("expecting map type".to_string()));
        }

        doc.validate()?;

        Ok(doc)
    }

    /// The certificates between the leaf and the root, ordered from the
    /// leaf's issuer upwards.  A root at the head of the CA bundle is not
    /// included (see [`AttestationDocument::embedded_root`]).
    pub fn certificate_chain(&self) -> Vec<Vec<u8>> {
        let skip = usize::from(self.embedded_root().is_some());

        self.cabundle.iter().skip(skip).rev().cloned().collect()
    }

    /// The self-issued certificate at the head of the CA bundle, if any
    pub fn embedded_root(&self) -> Option<&[u8]> {
        self.cabundle
            .first()
            .filter(|der| is_self_issued(der))
            .map(|der| der.as_slice())
    }

    fn parse(&mut self, contents: Vec<(Value, Value)>) -> Result<(), Error> {
        for (k, v) in contents.iter() {
            if let Value::Text(name) = k {
                match name.as_str() {
                    MODULE_ID_LABEL => self.set_module_id(v)?,
                    DIGEST_LABEL => self.set_digest(v)?,
                    TIMESTAMP_LABEL => self.set_timestamp(v)?,
                    PCRS_LABEL => self.set_pcrs(v)?,
                    CERTIFICATE_LABEL => self.set_certificate(v)?,
                    CABUNDLE_LABEL => self.set_cabundle(v)?,
                    PUBLIC_KEY_LABEL => self.set_public_key(v)?,
                    USER_DATA_LABEL => self.set_user_data(v)?,
                    NONCE_LABEL => self.set_nonce(v)?,
                    unknown => {
                        return Err(Error::MalformedDocument(format!(
                            "unknown key {unknown} in attestation document"
                        )))
                    }
                }
            } else {
                return Err(Error::MalformedDocument("expecting text key".to_string()));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), Error> {
        // public_key, user_data and nonce are optional
        let mandatory_fields = [
            (Fields::ModuleId, MODULE_ID_LABEL),
            (Fields::Digest, DIGEST_LABEL),
            (Fields::Timestamp, TIMESTAMP_LABEL),
            (Fields::Pcrs, PCRS_LABEL),
            (Fields::Certificate, CERTIFICATE_LABEL),
            (Fields::CaBundle, CABUNDLE_LABEL),
        ];

        for (f, n) in mandatory_fields.iter() {
            if !self.fields_set.contains(*f) {
                return Err(Error::MalformedDocument(format!("missing {n}")));
            }
        }

        // the digest may come after the registers in the map, hence we can
        // only check their size once everything has been parsed
        let want = self.digest.output_len();

        for (i, pcr) in self.pcrs.iter() {
            if pcr.len() != want {
                return Err(Error::MalformedDocument(format!(
                    "pcr {i} is {} bytes, {} requires {want}",
                    pcr.len(),
                    self.digest
                )));
            }
        }

        Ok(())
    }

    fn check_dup(&self, f: Fields, n: &str) -> Result<(), Error> {
        if self.fields_set.contains(f) {
            return Err(Error::MalformedDocument(format!("duplicated {n}")));
        }
        Ok(())
    }

    fn set_module_id(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::ModuleId, MODULE_ID_LABEL)?;

        let x = to_tstr(v, MODULE_ID_LABEL)?;

        if x.is_empty() {
            return Err(Error::MalformedDocument("empty module_id".to_string()));
        }

        self.module_id = x;

        self.fields_set.set(Fields::ModuleId);

        Ok(())
    }

    fn set_digest(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::Digest, DIGEST_LABEL)?;

        let x = to_tstr(v, DIGEST_LABEL)?;

        self.digest = DigestAlgorithm::from_name(&x)
            .ok_or_else(|| Error::MalformedDocument(format!("unknown digest {x}")))?;

        self.fields_set.set(Fields::Digest);

        Ok(())
    }

    fn set_timestamp(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::Timestamp, TIMESTAMP_LABEL)?;

        let x = to_uint(v, TIMESTAMP_LABEL)?;

        if x == 0 {
            return Err(Error::MalformedDocument("zero timestamp".to_string()));
        }

        self.timestamp = x;

        self.fields_set.set(Fields::Timestamp);

        Ok(())
    }

    fn set_pcrs(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::Pcrs, PCRS_LABEL)?;

        let entries = v
            .as_map()
            .ok_or_else(|| Error::MalformedDocument("pcrs MUST be map".to_string()))?;

        if entries.is_empty() {
            return Err(Error::MalformedDocument(
                "pcrs: expecting at least one register".to_string(),
            ));
        }

        for (k, pcr) in entries.iter() {
            let i = to_uint(k, "pcr index")?;

            if i >= MAX_PCRS {
                return Err(Error::MalformedDocument(format!(
                    "pcr index {i} out of range"
                )));
            }

            let x = to_bstr(pcr, &format!("pcr {i}"))?;

            if self.pcrs.insert(i as u16, x).is_some() {
                return Err(Error::MalformedDocument(format!("duplicated pcr {i}")));
            }
        }

        self.fields_set.set(Fields::Pcrs);

        Ok(())
    }

    fn set_certificate(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::Certificate, CERTIFICATE_LABEL)?;

        let x = to_bstr(v, CERTIFICATE_LABEL)?;

        if x.is_empty() {
            return Err(Error::MalformedDocument("empty certificate".to_string()));
        }

        self.certificate = x;

        self.fields_set.set(Fields::Certificate);

        Ok(())
    }

    fn set_cabundle(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::CaBundle, CABUNDLE_LABEL)?;

        let x = v
            .as_array()
            .ok_or_else(|| Error::MalformedDocument("cabundle MUST be array".to_string()))?;

        for (i, xi) in x.iter().enumerate() {
            let der = to_bstr(xi, &format!("cabundle[{i}]"))?;

            if der.is_empty() {
                return Err(Error::MalformedDocument(format!("empty cabundle[{i}]")));
            }

            self.cabundle.push(der);
        }

        self.fields_set.set(Fields::CaBundle);

        Ok(())
    }

    fn set_public_key(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::PublicKey, PUBLIC_KEY_LABEL)?;

        self.public_key = to_opt_bstr(v, PUBLIC_KEY_LABEL)?;

        self.fields_set.set(Fields::PublicKey);

        Ok(())
    }

    fn set_user_data(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::UserData, USER_DATA_LABEL)?;

        self.user_data = to_opt_bstr(v, USER_DATA_LABEL)?;

        self.fields_set.set(Fields::UserData);

        Ok(())
    }

    fn set_nonce(&mut self, v: &Value) -> Result<(), Error> {
        self.check_dup(Fields::Nonce, NONCE_LABEL)?;

        self.nonce = to_opt_bstr(v, NONCE_LABEL)?;

        self.fields_set.set(Fields::Nonce);

        Ok(())
    }
}

fn is_self_issued(der: &[u8]) -> bool {
    x509_parser::parse_x509_certificate(der)
        .map(|(_, c)| c.tbs_certificate.subject.as_raw() == c.tbs_certificate.issuer.as_raw())
        .unwrap_or(false)
}
