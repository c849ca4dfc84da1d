// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

//! Trusted roots and measurement reference values.

pub use self::itrustanchorstore::ITrustAnchorStore;
pub use self::memo_trustanchorstore::MemoTrustAnchorStore;
pub use self::refvalues::{ExpectedMeasurements, MeasurementInput};
pub use self::trustanchor::{TrustAnchor, AWS_NITRO_ENCLAVES_ROOT_G1};

mod itrustanchorstore;
mod memo_trustanchorstore;
mod refvalues;
mod trustanchor;
