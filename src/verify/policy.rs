// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::errors::Error;
use std::collections::BTreeMap;
use std::time::Duration;

/// Compare the document nonce against the expected one in constant time
pub fn check_nonce(expected: &[u8], document: Option<&[u8]>) -> Result<(), Error> {
    let got = document.ok_or_else(|| {
        Error::NonceMismatch("document carries no nonce".to_string())
    })?;

    if got.len() != expected.len() || !openssl::memcmp::eq(got, expected) {
        return Err(Error::NonceMismatch(
            "document nonce differs from the expected one".to_string(),
        ));
    }

    Ok(())
}

/// Check that the document timestamp (milliseconds since the Unix epoch) lies
/// within `tolerance` of `reference`, in either direction
pub fn check_freshness(
    document_ms: u64,
    reference: Duration,
    tolerance: Duration,
) -> Result<(), Error> {
    let document = Duration::from_millis(document_ms);

    let (skew, what) = if document > reference {
        (document - reference, "in the future")
    } else {
        (reference - document, "old")
    };

    if skew > tolerance {
        return Err(Error::StaleOrFutureDocument(format!(
            "document is {}ms {what}, tolerance is {}s",
            skew.as_millis(),
            tolerance.as_secs()
        )));
    }

    Ok(())
}

/// Every expected register must be present in the document and hold exactly
/// the expected bytes
pub fn check_measurements(
    expected: &BTreeMap<u16, Vec<u8>>,
    document: &BTreeMap<u16, Vec<u8>>,
) -> Result<(), Error> {
    for (idx, want) in expected.iter() {
        match document.get(idx) {
            Some(got) if got == want => continue,
            Some(_) => {
                log::debug!("register {idx} holds an unexpected value");
                return Err(Error::MeasurementMismatch(*idx));
            }
            None => {
                log::debug!("register {idx} is not in the document");
                return Err(Error::MeasurementMismatch(*idx));
            }
        }
    }

    Ok(())
}
