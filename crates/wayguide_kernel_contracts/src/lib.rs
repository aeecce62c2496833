#![forbid(unsafe_code)]

pub mod common;
pub mod geo;
pub mod places;
pub mod route;
pub mod session;
pub mod vision;

pub use common::{ContractViolation, MonotonicTimeNs, ReasonCodeId, Validate};
pub use geo::GeoPoint;
