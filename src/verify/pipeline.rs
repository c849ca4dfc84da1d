// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::chain::validate_chain;
use super::policy::{check_freshness, check_measurements, check_nonce};
use super::signature::{leaf_public_key, verify_signature};
use crate::config::PolicyConfig;
use crate::errors::Error;
use crate::store::{ExpectedMeasurements, MemoTrustAnchorStore};
use crate::token::{AttestationDocument, CoseSign1, DigestAlgorithm};
use bitmask::*;
use serde::Serialize;
use serde_with::hex::Hex;
use serde_with::DisplayFromStr;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

bitmask! {
    #[derive(Debug)]
    mask StageSet: u8 where flags Stage {
        Chain        = 0x01,
        Signature    = 0x02,
        Nonce        = 0x04,
        Freshness    = 0x08,
        Measurements = 0x10,
    }
}

/// What the caller expects of an attestation document
#[derive(Debug, Clone, Default)]
pub struct VerificationRequest {
    /// Raw COSE_Sign1 bytes
    pub document: Vec<u8>,
    pub expected_nonce: Option<Vec<u8>>,
    pub expected_measurements: Option<ExpectedMeasurements>,
    /// Time since the Unix epoch the document is judged at.  When absent, the
    /// document's own timestamp is used for certificate validity.
    pub reference_time: Option<Duration>,
    /// Overrides the configured freshness tolerance
    pub max_age: Option<Duration>,
}

impl VerificationRequest {
    pub fn new(document: Vec<u8>) -> Self {
        Self {
            document,
            ..Default::default()
        }
    }

    pub fn with_nonce(mut self, nonce: Vec<u8>) -> Self {
        self.expected_nonce = Some(nonce);
        self
    }

    pub fn with_measurements(mut self, m: ExpectedMeasurements) -> Self {
        self.expected_measurements = Some(m);
        self
    }

    pub fn at(mut self, reference_time: Duration) -> Self {
        self.reference_time = Some(reference_time);
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// The contents of a document that passed verification
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedReport {
    #[serde(rename = "module-id")]
    pub module_id: String,

    #[serde_as(as = "DisplayFromStr")]
    pub digest: DigestAlgorithm,

    /// Milliseconds since the Unix epoch
    pub timestamp: u64,

    #[serde_as(as = "BTreeMap<_, Hex>")]
    pub pcrs: BTreeMap<u16, Vec<u8>>,

    #[serde(rename = "public-key", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<Hex>")]
    pub public_key: Option<Vec<u8>>,

    #[serde(rename = "user-data", skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<Hex>")]
    pub user_data: Option<Vec<u8>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde_as(as = "Option<Hex>")]
    pub nonce: Option<Vec<u8>>,

    /// SHA-256 of the leaf certificate
    #[serde(rename = "leaf-fingerprint")]
    pub leaf_fingerprint: String,

    /// SHA-256 of the root the chain terminates in
    #[serde(rename = "root-fingerprint", skip_serializing_if = "Option::is_none")]
    pub root_fingerprint: Option<String>,
}

/// Stateless attestation verifier.  The trust anchors are shared read-only,
/// so a `Verifier` can be used from any number of threads at once.
#[derive(Debug, Clone)]
pub struct Verifier {
    anchors: Arc<MemoTrustAnchorStore>,
    policy: PolicyConfig,
}

impl Verifier {
    pub fn new(anchors: Arc<MemoTrustAnchorStore>, policy: PolicyConfig) -> Self {
        Self { anchors, policy }
    }

    /// A verifier that trusts the AWS Nitro Enclaves root only
    pub fn nitro(policy: PolicyConfig) -> Result<Self, Error> {
        Ok(Self::new(Arc::new(MemoTrustAnchorStore::nitro()?), policy))
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Run every check: certificate chain, COSE signature, nonce, freshness
    /// and measurements.  The request must carry a nonce, a reference time
    /// and the expected measurements.
    pub fn verify_attestation(&self, req: &VerificationRequest) -> Result<VerifiedReport, Error> {
        let mut stages = StageSet::none();
        stages.set(Stage::Chain);
        stages.set(Stage::Signature);
        stages.set(Stage::Nonce);
        stages.set(Stage::Freshness);
        stages.set(Stage::Measurements);

        self.run(req, stages)
    }

    /// Establish authenticity only: certificate chain and COSE signature.
    /// Nonce, freshness and measurements in the request are ignored.
    pub fn verify_signature_only(
        &self,
        req: &VerificationRequest,
    ) -> Result<VerifiedReport, Error> {
        let mut stages = StageSet::none();
        stages.set(Stage::Chain);
        stages.set(Stage::Signature);

        self.run(req, stages)
    }

    fn run(&self, req: &VerificationRequest, stages: StageSet) -> Result<VerifiedReport, Error> {
        // everything structural is settled before any crypto is attempted
        let envelope = CoseSign1::decode(&req.document)?;
        let alg = envelope.algorithm()?;
        let doc = AttestationDocument::decode(&envelope.payload)?;

        log::debug!(
            "decoded {alg:?} document from {} issued at {}ms, {} registers",
            doc.module_id,
            doc.timestamp,
            doc.pcrs.len()
        );

        let expected_nonce = if stages.contains(Stage::Nonce) {
            Some(
                req.expected_nonce
                    .as_deref()
                    .ok_or_else(|| Error::MalformedInput("no expected nonce".to_string()))?,
            )
        } else {
            None
        };

        let expected_pcrs = if stages.contains(Stage::Measurements) {
            let m = req.expected_measurements.as_ref().ok_or_else(|| {
                Error::MalformedInput("no expected measurements".to_string())
            })?;
            Some(m.resolve(self.policy.default_measurement_index))
        } else {
            None
        };

        let freshness_ref = if stages.contains(Stage::Freshness) {
            Some(req.reference_time.ok_or_else(|| {
                Error::MalformedInput("no reference time".to_string())
            })?)
        } else {
            None
        };

        let reference_secs = match req.reference_time {
            Some(t) => i64::try_from(t.as_secs())
                .map_err(|_| Error::MalformedInput("reference time out of range".to_string()))?,
            None => i64::try_from(doc.timestamp / 1000)
                .map_err(|_| Error::MalformedDocument("timestamp out of range".to_string()))?,
        };

        let mut root_fingerprint = None;

        if stages.contains(Stage::Chain) {
            let chain = validate_chain(
                &doc.certificate,
                &doc.certificate_chain(),
                doc.embedded_root(),
                &*self.anchors,
                reference_secs,
            )?;

            log::debug!(
                "chain valid at {reference_secs}, anchored in {}",
                chain.anchor.subject
            );

            root_fingerprint = Some(chain.anchor.fingerprint);
        }

        if stages.contains(Stage::Signature) {
            let key = leaf_public_key(&doc.certificate)?;

            verify_signature(
                &envelope.protected,
                &envelope.payload,
                &envelope.signature,
                &key,
                alg,
            )?;

            log::debug!("COSE_Sign1 signature valid");
        }

        if let Some(n) = expected_nonce {
            check_nonce(n, doc.nonce.as_deref())?;

            log::debug!("nonce matches");
        }

        if let Some(reference) = freshness_ref {
            let tolerance = req.max_age.unwrap_or(self.policy.max_age);

            check_freshness(doc.timestamp, reference, tolerance)?;

            log::debug!("timestamp within {}s of reference", tolerance.as_secs());
        }

        if let Some(expected) = expected_pcrs {
            check_measurements(&expected, &doc.pcrs)?;

            log::debug!(
                "registers {:?} match",
                expected.keys().collect::<Vec<_>>()
            );
        }

        Ok(VerifiedReport {
            leaf_fingerprint: hex::encode(openssl::sha::sha256(&doc.certificate)),
            root_fingerprint,
            module_id: doc.module_id,
            digest: doc.digest,
            timestamp: doc.timestamp,
            pcrs: doc.pcrs,
            public_key: doc.public_key,
            user_data: doc.user_data,
            nonce: doc.nonce,
        })
    }
}
