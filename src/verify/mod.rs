// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Verification of decoded attestation documents.
//!
//! A [`Verifier`] chains the leaf certificate up to a trusted root, checks
//! the COSE_Sign1 signature with the leaf key and then applies the caller's
//! policy: nonce, freshness and measurement registers.  The first failing
//! check decides the outcome.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tee_verifier::config::PolicyConfig;
//! use tee_verifier::store::ExpectedMeasurements;
//! use tee_verifier::verify::{VerificationRequest, Verifier};
//!
//! let raw: Vec<u8> = std::fs::read("attestation.cbor").expect("reading document");
//!
//! let v = Verifier::nitro(PolicyConfig::default()).expect("loading trust anchors");
//!
//! let req = VerificationRequest::new(raw)
//!     .with_nonce(vec![0u8; 20])
//!     .with_measurements(ExpectedMeasurements::Single(vec![0u8; 48]))
//!     .at(Duration::from_secs(1717203600));
//!
//! match v.verify_attestation(&req) {
//!     Ok(report) => println!("{} is genuine", report.module_id),
//!     Err(e) => println!("untrusted: {e}"),
//! }
//! ```

pub use self::chain::{validate_chain, ValidatedChain};
pub use self::pipeline::{VerificationRequest, VerifiedReport, Verifier};
pub use self::policy::{check_freshness, check_measurements, check_nonce};
pub use self::signature::{leaf_public_key, verify_signature};

mod chain;
mod pipeline;
mod policy;
mod signature;

#[cfg(test)]
pub(crate) mod testutil;
