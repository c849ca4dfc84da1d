// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Text-in, verdict-out entry points for embedding the verifier.
//!
//! The engine is process-wide: [`initialize`] loads the compiled-in AWS Nitro
//! Enclaves root and starts the worker pool, [`teardown`] releases both.
//! Verification calls made outside that window fail with
//! [`Error::NotInitialized`].
//!
//! A call returns `Err` when the input cannot be evaluated (bad base64 or
//! hex, malformed CBOR, unsupported algorithms).  A document that was
//! evaluated and found wanting yields `Ok(Verdict::Untrusted(reason))`.

pub mod encoding;
pub mod executor;

use self::executor::{Executor, Inline, Job, WorkerPool};
use crate::config::InitOptions;
use crate::errors::Error;
use crate::store::{ExpectedMeasurements, MeasurementInput, MemoTrustAnchorStore};
use crate::verify::{VerificationRequest, VerifiedReport, Verifier};
use std::sync::{Arc, Once, RwLock};
use std::time::Duration;

static ENGINE: RwLock<Option<Arc<Engine>>> = RwLock::new(None);
static LOGGER: Once = Once::new();

/// Outcome of evaluating a well-formed attestation document
#[derive(Debug, PartialEq, Eq)]
pub enum Verdict {
    Trusted(VerifiedReport),
    Untrusted(Error),
}

impl Verdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verdict::Trusted(_))
    }

    /// Human readable reason of an untrusted verdict
    pub fn reason(&self) -> Option<String> {
        match self {
            Verdict::Trusted(_) => None,
            Verdict::Untrusted(e) => Some(e.to_string()),
        }
    }

    pub fn report(&self) -> Option<&VerifiedReport> {
        match self {
            Verdict::Trusted(r) => Some(r),
            Verdict::Untrusted(_) => None,
        }
    }
}

/// Split a verification outcome into a verdict or a hard error
fn verdict_of(module: &str, r: Result<VerifiedReport, Error>) -> Result<Verdict, Error> {
    match r {
        Ok(report) => {
            log::info!("{module}: {} is trusted", report.module_id);
            Ok(Verdict::Trusted(report))
        }
        Err(e) if e.is_structural() => {
            log::info!("{module}: cannot evaluate document: {e}");
            Err(e)
        }
        Err(e) => {
            log::warn!("{module}: document is untrusted: {e}");
            Ok(Verdict::Untrusted(e))
        }
    }
}

/// A verifier bound to an executor
#[derive(Debug)]
pub struct Engine {
    verifier: Verifier,
    executor: Box<dyn Executor>,
}

impl Engine {
    /// Build an engine trusting the roots in `anchors`
    pub fn new(opts: &InitOptions, anchors: MemoTrustAnchorStore) -> Result<Self, Error> {
        if anchors.is_empty() {
            return Err(Error::Internal("no trust anchors".to_string()));
        }

        let executor: Box<dyn Executor> = match opts.hardware_concurrency {
            Some(0) => Box::new(Inline),
            Some(n) => Box::new(WorkerPool::new(n)?),
            None => Box::new(WorkerPool::new(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            )?),
        };

        Ok(Self {
            verifier: Verifier::new(Arc::new(anchors), opts.policy.clone()),
            executor,
        })
    }

    /// Full verification of a base64 encoded attestation document against
    /// a hex nonce, the expected measurements and a reference time in
    /// seconds since the Unix epoch
    pub async fn verify_code_attestation(
        &self,
        document_base64: &str,
        expected_nonce_hex: &str,
        expected_measurements: &MeasurementInput,
        reference_unix_seconds: u64,
    ) -> Result<Verdict, Error> {
        let req = VerificationRequest::new(encoding::decode_base64(document_base64)?)
            .with_nonce(encoding::decode_hex(expected_nonce_hex)?)
            .with_measurements(ExpectedMeasurements::try_from(expected_measurements)?)
            .at(Duration::from_secs(reference_unix_seconds));

        let verifier = self.verifier.clone();

        let job: Job = Box::new(move || {
            verdict_of("verify_code_attestation", verifier.verify_attestation(&req))
        });

        self.executor.submit(job).await
    }

    /// Authenticity only: certificate chain and signature of a base64
    /// encoded attestation document
    pub async fn verify_signature(&self, document_base64: &str) -> Result<Verdict, Error> {
        let req = VerificationRequest::new(encoding::decode_base64(document_base64)?);

        let verifier = self.verifier.clone();

        let job: Job = Box::new(move || {
            verdict_of("verify_signature", verifier.verify_signature_only(&req))
        });

        self.executor.submit(job).await
    }
}

/// Set up the process-wide engine with the AWS Nitro Enclaves root.  Calling
/// it again while initialized keeps the existing engine.
pub fn initialize(opts: InitOptions) -> Result<(), Error> {
    initialize_with_anchors(opts, MemoTrustAnchorStore::nitro()?)
}

/// Like [`initialize`], trusting the roots in `anchors` instead
pub fn initialize_with_anchors(
    opts: InitOptions,
    anchors: MemoTrustAnchorStore,
) -> Result<(), Error> {
    let mut g = ENGINE
        .write()
        .map_err(|e| Error::Internal(format!("engine lock: {e}")))?;

    LOGGER.call_once(|| {
        // the host may have installed a logger of its own already
        let _ = env_logger::Builder::new()
            .filter_level(opts.logging_level.into())
            .try_init();
    });
    log::set_max_level(opts.logging_level.into());

    if g.is_some() {
        log::debug!("already initialized");
        return Ok(());
    }

    *g = Some(Arc::new(Engine::new(&opts, anchors)?));

    log::info!("verifier initialized: {opts:?}");

    Ok(())
}

/// Release the process-wide engine.  In-flight verifications complete.
pub fn teardown() {
    if let Ok(mut g) = ENGINE.write() {
        if g.take().is_some() {
            log::info!("verifier torn down");
        }
    }
}

fn engine() -> Result<Arc<Engine>, Error> {
    ENGINE
        .read()
        .map_err(|e| Error::Internal(format!("engine lock: {e}")))?
        .clone()
        .ok_or(Error::NotInitialized)
}

/// See [`Engine::verify_code_attestation`]
pub async fn verify_code_attestation(
    document_base64: &str,
    expected_nonce_hex: &str,
    expected_measurements: &MeasurementInput,
    reference_unix_seconds: u64,
) -> Result<Verdict, Error> {
    engine()?
        .verify_code_attestation(
            document_base64,
            expected_nonce_hex,
            expected_measurements,
            reference_unix_seconds,
        )
        .await
}

/// See [`Engine::verify_signature`]
pub async fn verify_signature(document_base64: &str) -> Result<Verdict, Error> {
    engine()?.verify_signature(document_base64).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::testutil::{DocumentBuilder, TEST_TIME_SECS};
    use base64::{engine::general_purpose, Engine as _};

    const TEST_ROOT_PEM: &str = include_str!("../../testdata/root.pem");
    const ZERO_NONCE: &str = "0000000000000000000000000000000000000000";

    fn test_anchors() -> MemoTrustAnchorStore {
        let mut s = MemoTrustAnchorStore::new();
        s.load_pem(TEST_ROOT_PEM).unwrap();
        s
    }

    fn engine_with(threads: Option<usize>) -> Engine {
        let opts = InitOptions {
            hardware_concurrency: threads,
            ..Default::default()
        };

        Engine::new(&opts, test_anchors()).unwrap()
    }

    fn document_b64() -> String {
        general_purpose::STANDARD.encode(DocumentBuilder::default().build())
    }

    fn pcr2() -> MeasurementInput {
        MeasurementInput::Single(hex::encode([2u8; 48]))
    }

    #[tokio::test]
    async fn trusted_verdict() {
        let e = engine_with(Some(0));

        let v = e
            .verify_code_attestation(&document_b64(), ZERO_NONCE, &pcr2(), TEST_TIME_SECS)
            .await
            .unwrap();

        assert!(v.is_trusted());
        assert_eq!(v.reason(), None);
        assert_eq!(v.report().map(|r| r.pcrs[&2].clone()), Some(vec![2u8; 48]));
    }

    #[tokio::test]
    async fn verdicts_do_not_depend_on_executor() {
        let inline = engine_with(Some(0));
        let pool = engine_with(Some(2));
        let doc = document_b64();

        for t in [TEST_TIME_SECS, TEST_TIME_SECS + 301, TEST_TIME_SECS + 7200] {
            let a = inline
                .verify_code_attestation(&doc, ZERO_NONCE, &pcr2(), t)
                .await;
            let b = pool.verify_code_attestation(&doc, ZERO_NONCE, &pcr2(), t).await;

            assert_eq!(a, b, "at {t}");
        }
    }

    #[tokio::test]
    async fn untrusted_verdicts() {
        let e = engine_with(Some(0));
        let doc = document_b64();

        let v = e
            .verify_code_attestation(&doc, &"11".repeat(20), &pcr2(), TEST_TIME_SECS)
            .await
            .unwrap();
        assert!(matches!(v, Verdict::Untrusted(Error::NonceMismatch(_))));

        let v = e
            .verify_code_attestation(&doc, ZERO_NONCE, &pcr2(), TEST_TIME_SECS + 301)
            .await
            .unwrap();
        assert!(matches!(v, Verdict::Untrusted(Error::StaleOrFutureDocument(_))));

        let multi = MeasurementInput::Multi(
            [("3".to_string(), hex::encode([4u8; 48]))].into_iter().collect(),
        );
        let v = e
            .verify_code_attestation(&doc, ZERO_NONCE, &multi, TEST_TIME_SECS)
            .await
            .unwrap();
        assert_eq!(v, Verdict::Untrusted(Error::MeasurementMismatch(3)));
        assert_eq!(
            v.reason(),
            Some("Measurement mismatch on register 3".to_string())
        );
    }

    #[tokio::test]
    async fn malformed_input_is_an_error() {
        let e = engine_with(Some(0));

        let r = e
            .verify_code_attestation("%%%", ZERO_NONCE, &pcr2(), TEST_TIME_SECS)
            .await;
        assert!(matches!(r, Err(Error::MalformedInput(_))));

        let r = e
            .verify_code_attestation(&document_b64(), "xyz", &pcr2(), TEST_TIME_SECS)
            .await;
        assert!(matches!(r, Err(Error::MalformedInput(_))));

        let r = e.verify_signature("3q2+7w==").await;
        assert!(matches!(r, Err(Error::MalformedEnvelope(_))));
    }

    #[tokio::test]
    async fn signature_only() {
        let e = engine_with(Some(1));

        let v = e.verify_signature(&document_b64()).await.unwrap();

        assert!(v.is_trusted());
    }

    // The only test touching the process-wide engine.
    #[tokio::test]
    async fn lifecycle() {
        let doc = document_b64();

        assert_eq!(
            verify_signature(&doc).await.unwrap_err(),
            Error::NotInitialized
        );

        initialize_with_anchors(InitOptions::default(), test_anchors()).unwrap();
        assert!(verify_signature(&doc).await.unwrap().is_trusted());

        // a second initialize keeps the engine and its anchors
        initialize(InitOptions::default()).unwrap();
        assert!(verify_signature(&doc).await.unwrap().is_trusted());

        let v = verify_code_attestation(&doc, ZERO_NONCE, &pcr2(), TEST_TIME_SECS)
            .await
            .unwrap();
        assert!(v.is_trusted());

        teardown();
        assert_eq!(
            verify_code_attestation(&doc, ZERO_NONCE, &pcr2(), TEST_TIME_SECS)
                .await
                .unwrap_err(),
            Error::NotInitialized
        );

        // the compiled-in Nitro root does not vouch for the test hierarchy
        initialize(InitOptions::default()).unwrap();
        let v = verify_signature(&doc).await.unwrap();
        assert!(matches!(v, Verdict::Untrusted(Error::ChainBuildFailure(_))));

        teardown();
    }
}
