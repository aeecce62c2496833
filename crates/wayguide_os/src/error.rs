#![forbid(unsafe_code)]

use wayguide_kernel_contracts::{ContractViolation, ReasonCodeId};

pub mod reason_codes {
    use wayguide_kernel_contracts::ReasonCodeId;

    // Navigation session reason-code namespace ("NS").
    pub const NS_NO_LOCATION: ReasonCodeId = ReasonCodeId(0x4E53_0001);
    pub const NS_NO_ACTIVE_NAVIGATION: ReasonCodeId = ReasonCodeId(0x4E53_0002);
    pub const NS_NO_ROUTE: ReasonCodeId = ReasonCodeId(0x4E53_0003);
    pub const NS_INVALID_INPUT: ReasonCodeId = ReasonCodeId(0x4E53_0004);
    pub const NS_VISION_DISABLED: ReasonCodeId = ReasonCodeId(0x4E53_0005);
    pub const NS_VISION_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4E53_0006);
    pub const NS_ROUTING_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4E53_0007);
    pub const NS_PLACES_UNAVAILABLE: ReasonCodeId = ReasonCodeId(0x4E53_0008);
    pub const NS_UNKNOWN_SESSION: ReasonCodeId = ReasonCodeId(0x4E53_0009);
    pub const NS_INTERNAL: ReasonCodeId = ReasonCodeId(0x4E53_00FF);
}

/// Failure of a produced session operation. `Display` is the message handed back to clients.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("{0}")]
    NoLocation(String),
    #[error("{0}")]
    NoActiveNavigation(String),
    #[error("{0}")]
    NoRoute(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("Vision guidance is disabled.")]
    VisionDisabled,
    #[error("Vision unavailable: {0}")]
    VisionUnavailable(String),
    #[error("{0}")]
    RoutingUnavailable(String),
    #[error("{0}")]
    PlacesUnavailable(String),
    #[error("No navigation session for client '{0}'.")]
    UnknownSession(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NavigationError {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            NavigationError::NoLocation(_) => reason_codes::NS_NO_LOCATION,
            NavigationError::NoActiveNavigation(_) => reason_codes::NS_NO_ACTIVE_NAVIGATION,
            NavigationError::NoRoute(_) => reason_codes::NS_NO_ROUTE,
            NavigationError::InvalidInput(_) => reason_codes::NS_INVALID_INPUT,
            NavigationError::VisionDisabled => reason_codes::NS_VISION_DISABLED,
            NavigationError::VisionUnavailable(_) => reason_codes::NS_VISION_UNAVAILABLE,
            NavigationError::RoutingUnavailable(_) => reason_codes::NS_ROUTING_UNAVAILABLE,
            NavigationError::PlacesUnavailable(_) => reason_codes::NS_PLACES_UNAVAILABLE,
            NavigationError::UnknownSession(_) => reason_codes::NS_UNKNOWN_SESSION,
            NavigationError::Internal(_) => reason_codes::NS_INTERNAL,
        }
    }

    pub(crate) fn no_active_navigation() -> Self {
        NavigationError::NoActiveNavigation("No active navigation.".to_string())
    }

    pub(crate) fn no_location() -> Self {
        NavigationError::NoLocation(
            "Current location not available. Please allow location access.".to_string(),
        )
    }
}

impl From<ContractViolation> for NavigationError {
    fn from(v: ContractViolation) -> Self {
        NavigationError::InvalidInput(v.to_string())
    }
}
