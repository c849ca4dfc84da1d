// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! The token module decodes the two layers of a Nitro attestation document:
//! the [`CoseSign1`] envelope and the CBOR [`AttestationDocument`] carried
//! as its payload.
//!
//! Decoding is strict: a buffer must hold exactly one item, unknown or
//! duplicated document fields are rejected and every measurement register
//! must have the size of the declared digest.  Nothing is verified here.
//!
//! # Example
//!
//! ```no_run
//! use tee_verifier::token::{AttestationDocument, CoseSign1};
//!
//! let raw: Vec<u8> = std::fs::read("attestation.cbor").expect("reading document");
//!
//! let envelope = CoseSign1::decode(&raw).expect("decoding COSE_Sign1");
//! let doc = AttestationDocument::decode(&envelope.payload).expect("decoding payload");
//!
//! println!("{} signed at {}", doc.module_id, doc.timestamp);
//! ```

pub use self::common::DigestAlgorithm;
pub use self::document::AttestationDocument;
pub use self::envelope::{CoseAlgorithm, CoseSign1};

pub(crate) use self::envelope::sig_structure;

mod common;
mod document;
mod envelope;
