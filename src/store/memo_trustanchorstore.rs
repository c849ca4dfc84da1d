// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::trustanchor::{TrustAnchor, AWS_NITRO_ENCLAVES_ROOT_G1};
use super::ITrustAnchorStore;
use crate::errors::Error;
use std::collections::HashMap;
use std::sync::RwLock;

/// The store where the trusted roots are stashed.  Roots are indexed by their
/// DER encoded subject name.
#[derive(Debug)]
pub struct MemoTrustAnchorStore {
    p: RwLock<HashMap<Vec<u8>, TrustAnchor>>,
}

impl Default for MemoTrustAnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoTrustAnchorStore {
    /// Returns a new empty TrustAnchorStore
    pub fn new() -> Self {
        Self {
            p: Default::default(),
        }
    }

    /// Returns a store holding only the compiled-in AWS Nitro Enclaves root
    pub fn nitro() -> Result<Self, Error> {
        let mut s = Self::new();
        s.load_pem(AWS_NITRO_ENCLAVES_ROOT_G1)?;
        Ok(s)
    }

    /// Add to an existing (and possibly empty) TrustAnchorStore the root
    /// certificate in the given PEM
    pub fn load_pem(&mut self, pem: &str) -> Result<(), Error> {
        self.insert(TrustAnchor::from_pem(pem)?)
    }

    /// Add to an existing (and possibly empty) TrustAnchorStore the root
    /// certificate in the given DER
    pub fn load_der(&mut self, der: &[u8]) -> Result<(), Error> {
        self.insert(TrustAnchor::from_der(der)?)
    }

    pub fn len(&self) -> usize {
        self.p.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, ta: TrustAnchor) -> Result<(), Error> {
        log::debug!("trusting root {} (sha256:{})", ta.subject, ta.fingerprint);

        self.p
            .write()
            .map_err(|e| Error::Internal(format!("trust anchor store lock: {e}")))?
            .insert(ta.subject_raw.clone(), ta);

        Ok(())
    }
}

impl ITrustAnchorStore for MemoTrustAnchorStore {
    /// Lookup a trust anchor from the store given its raw subject
    fn lookup(&self, subject: &[u8]) -> Option<TrustAnchor> {
        self.p.read().ok()?.get(subject).cloned()
    }

    fn contains(&self, der: &[u8]) -> bool {
        self.p
            .read()
            .map(|m| m.values().any(|ta| ta.der == der))
            .unwrap_or(false)
    }
}
