// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! AWS Nitro Enclaves attestation document verification.
//!
//! This crate provides an API to decode and verify the attestation documents
//! produced by the Nitro Secure Module of an enclave, and to check them
//! against a relying party's expectations.  For detailed information about
//! the format, see the [Nitro Enclaves] documentation.
//!
//! The API allows:
//! * Decoding the COSE_Sign1 envelope and the CBOR attestation document
//! * Validating the certificate chain up to the AWS Nitro Enclaves root
//! * Verifying the document signature with the enclave's leaf certificate
//! * Checking the nonce, the document age and the measurement registers
//!   (PCRs) against user-supplied values
//!
//! [Nitro Enclaves]: https://docs.aws.amazon.com/enclaves/latest/user/verify-root.html

pub mod api;
pub mod config;
pub mod errors;
pub mod store;
pub mod token;
pub mod verify;

pub use self::api::Verdict;
pub use self::errors::Error;
