// Copyright 2024 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use crate::api::encoding::decode_hex;
use crate::errors::Error;
use serde::{Deserialize, Serialize};
use serde_with::DisplayFromStr;
use std::collections::BTreeMap;

/// Expected measurements as they come in from a caller: either a single hex
/// string, or a map from register index (as a decimal string) to hex string.
/// Hex values may be mixed case, carry a `0x` prefix and embedded whitespace.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MeasurementInput {
    Single(String),
    Multi(BTreeMap<String, String>),
}

impl From<&str> for MeasurementInput {
    fn from(v: &str) -> Self {
        MeasurementInput::Single(v.to_string())
    }
}

/// Reference values for the measurement registers (PCRs) of an enclave.
///
/// The JSON format is either a bare hex string, which is matched against
/// the default register, or an object keyed by register index:
///
/// ```json
/// { "1": "c0ffee...", "2": "deadbeef..." }
/// ```
#[serde_with::serde_as]
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExpectedMeasurements {
    /// One value, compared against the default register index
    Single(#[serde_as(as = "serde_with::hex::Hex")] Vec<u8>),

    /// Register index to expected value
    Multi(
        #[serde_as(as = "BTreeMap<DisplayFromStr, serde_with::hex::Hex>")] BTreeMap<u16, Vec<u8>>,
    ),
}

impl ExpectedMeasurements {
    /// Parse reference values from JSON
    pub fn load_json(j: &str) -> Result<Self, Error> {
        let v: ExpectedMeasurements =
            serde_json::from_str(j).map_err(|e| Error::MalformedInput(e.to_string()))?;

        v.validate()?;

        Ok(v)
    }

    /// Flatten into a register index to value map, placing a single value at
    /// `default_index`
    pub fn resolve(&self, default_index: u16) -> BTreeMap<u16, Vec<u8>> {
        match self {
            ExpectedMeasurements::Single(v) => BTreeMap::from([(default_index, v.clone())]),
            ExpectedMeasurements::Multi(m) => m.clone(),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        let empty = match self {
            ExpectedMeasurements::Single(v) => v.is_empty(),
            ExpectedMeasurements::Multi(m) => m.is_empty() || m.values().any(|v| v.is_empty()),
        };

        if empty {
            return Err(Error::MalformedInput(
                "empty expected measurement".to_string(),
            ));
        }

        Ok(())
    }
}

impl TryFrom<&MeasurementInput> for ExpectedMeasurements {
    type Error = Error;

    fn try_from(input: &MeasurementInput) -> Result<Self, Self::Error> {
        let v = match input {
            MeasurementInput::Single(s) => ExpectedMeasurements::Single(decode_hex(s)?),
            MeasurementInput::Multi(m) => {
                let mut out = BTreeMap::new();

                for (k, s) in m.iter() {
                    let idx: u16 = k.trim().parse().map_err(|_| {
                        Error::MalformedInput(format!("register index {k:?} is not a number"))
                    })?;

                    if out.insert(idx, decode_hex(s)?).is_some() {
                        return Err(Error::MalformedInput(format!(
                            "register index {idx} given twice"
                        )));
                    }
                }

                ExpectedMeasurements::Multi(out)
            }
        };

        v.validate()?;

        Ok(v)
    }
}
