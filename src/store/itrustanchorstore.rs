// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::trustanchor::TrustAnchor;

/// Interface to the store where the trusted roots are stashed.
pub trait ITrustAnchorStore {
    /// Lookup a trust anchor from the store given its DER encoded subject
    fn lookup(&self, subject: &[u8]) -> Option<TrustAnchor>;

    /// Whether the store holds a root that is byte-for-byte identical to `der`
    fn contains(&self, der: &[u8]) -> bool;
}
