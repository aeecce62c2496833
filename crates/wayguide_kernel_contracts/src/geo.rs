#![forbid(unsafe_code)]

use crate::{ContractViolation, Validate};

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn v1(lat: f64, lng: f64) -> Result<Self, ContractViolation> {
        let p = Self { lat, lng };
        p.validate()?;
        Ok(p)
    }

    /// Builds a point from an `[lng, lat]` pair as emitted by GeoJSON and OSRM.
    pub fn from_lng_lat(pair: [f64; 2]) -> Result<Self, ContractViolation> {
        Self::v1(pair[1], pair[0])
    }
}

impl Validate for GeoPoint {
    fn validate(&self) -> Result<(), ContractViolation> {
        if !self.lat.is_finite() {
            return Err(ContractViolation::NotFinite { field: "geo_point.lat" });
        }
        if !self.lng.is_finite() {
            return Err(ContractViolation::NotFinite { field: "geo_point.lng" });
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lat",
                min: -90.0,
                max: 90.0,
                got: self.lat,
            });
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(ContractViolation::InvalidRange {
                field: "geo_point.lng",
                min: -180.0,
                max: 180.0,
                got: self.lng,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_geo_01_rejects_out_of_range_and_nan() {
        assert!(GeoPoint::v1(24.4, 54.6).is_ok());
        assert!(matches!(
            GeoPoint::v1(91.0, 0.0),
            Err(ContractViolation::InvalidRange { field: "geo_point.lat", .. })
        ));
        assert!(matches!(
            GeoPoint::v1(0.0, f64::NAN),
            Err(ContractViolation::NotFinite { field: "geo_point.lng" })
        ));
    }

    #[test]
    fn at_geo_02_lng_lat_pair_order() {
        let p = GeoPoint::from_lng_lat([54.6, 24.4]).unwrap();
        assert_eq!(p.lat, 24.4);
        assert_eq!(p.lng, 54.6);
    }
}
