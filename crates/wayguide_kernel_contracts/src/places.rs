#![forbid(unsafe_code)]

use crate::common::{validate_non_negative, validate_text};
use crate::{ContractViolation, GeoPoint, Validate};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaceCandidate {
    pub name: String,
    pub location: GeoPoint,
    pub address: Option<String>,
    /// Distance from the search origin, when one was given.
    pub distance_m: Option<f64>,
}

impl PlaceCandidate {
    pub fn v1(
        name: String,
        location: GeoPoint,
        address: Option<String>,
        distance_m: Option<f64>,
    ) -> Result<Self, ContractViolation> {
        let p = Self {
            name,
            location,
            address,
            distance_m,
        };
        p.validate()?;
        Ok(p)
    }
}

impl Validate for PlaceCandidate {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("place_candidate.name", &self.name, 512)?;
        self.location.validate()?;
        if let Some(address) = &self.address {
            validate_text("place_candidate.address", address, 1024)?;
        }
        if let Some(d) = self.distance_m {
            validate_non_negative("place_candidate.distance_m", d)?;
        }
        Ok(())
    }
}
