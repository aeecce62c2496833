#![forbid(unsafe_code)]

use crate::common::{validate_text, validate_token};
use crate::{ContractViolation, GeoPoint, Validate};

pub const SESSION_ID_MAX_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        validate_token("session_id", &id, SESSION_ID_MAX_LEN)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPhase {
    NoRoute,
    Navigating,
    Arrived,
}

impl NavigationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            NavigationPhase::NoRoute => "no_route",
            NavigationPhase::Navigating => "navigating",
            NavigationPhase::Arrived => "arrived",
        }
    }
}

/// Target of a navigation, kept so reroutes can aim at the same place.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Destination {
    pub location: GeoPoint,
    pub name: Option<String>,
}

impl Destination {
    pub fn v1(location: GeoPoint, name: Option<String>) -> Result<Self, ContractViolation> {
        let d = Self { location, name };
        d.validate()?;
        Ok(d)
    }

    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{:.5}, {:.5}", self.location.lat, self.location.lng),
        }
    }
}

impl Validate for Destination {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.location.validate()?;
        if let Some(name) = &self.name {
            validate_text("destination.name", name, 256)?;
        }
        Ok(())
    }
}
