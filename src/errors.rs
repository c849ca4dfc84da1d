// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

#[derive(thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Malformed COSE envelope: {0}")]
    MalformedEnvelope(String),
    #[error("Malformed attestation document: {0}")]
    MalformedDocument(String),
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("Certificate chain build failed: {0}")]
    ChainBuildFailure(String),
    #[error("Certificate expired: {0}")]
    CertificateExpired(String),
    #[error("Certificate not yet valid: {0}")]
    CertificateNotYetValid(String),
    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),
    #[error("Algorithm mismatch: {0}")]
    AlgorithmMismatch(String),
    #[error("Nonce mismatch: {0}")]
    NonceMismatch(String),
    #[error("Stale or future document: {0}")]
    StaleOrFutureDocument(String),
    #[error("Measurement mismatch on register {0}")]
    MeasurementMismatch(u16),
    #[error("Verifier not initialized")]
    NotInitialized,
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Structural errors mean the input could not be evaluated at all.  All
    /// other errors are the outcome of evaluating a well-formed document and
    /// finding it untrusted.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::MalformedInput(_)
                | Error::MalformedEnvelope(_)
                | Error::MalformedDocument(_)
                | Error::UnsupportedAlgorithm(_)
                | Error::NotInitialized
                | Error::Internal(_)
        )
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_split() {
        assert!(Error::MalformedEnvelope("x".to_string()).is_structural());
        assert!(Error::UnsupportedAlgorithm("x".to_string()).is_structural());
        assert!(Error::NotInitialized.is_structural());

        assert!(!Error::SignatureInvalid("x".to_string()).is_structural());
        assert!(!Error::NonceMismatch("x".to_string()).is_structural());
        assert!(!Error::MeasurementMismatch(2).is_structural());
        assert!(!Error::ChainBuildFailure("x".to_string()).is_structural());
    }

    #[test]
    fn measurement_mismatch_names_register() {
        let e = Error::MeasurementMismatch(2);

        assert_eq!(e.to_string(), "Measurement mismatch on register 2");
    }
}
