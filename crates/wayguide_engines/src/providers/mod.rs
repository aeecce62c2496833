#![forbid(unsafe_code)]

//! Collaborator seams (routing, places, vision, speech) and their implementations.

use wayguide_kernel_contracts::places::PlaceCandidate;
use wayguide_kernel_contracts::route::{EngineTag, Route, RoutingMode};
use wayguide_kernel_contracts::vision::VisionAnalysis;
use wayguide_kernel_contracts::GeoPoint;

mod http;
pub mod nominatim;
pub mod osrm;
pub mod speech;
pub mod vision;

pub use nominatim::{NominatimConfig, NominatimPlaceProvider};
pub use osrm::{OsrmConfig, OsrmRoutingProvider};
pub use speech::{Announcement, BufferedSpeechSink};
pub use vision::{
    FallbackVisionProvider, HeuristicVisionProvider, OpenAiCompatVisionProvider,
    VisionProviderConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} timed out")]
    Timeout { provider: &'static str },
    #[error("{provider} transport failure ({kind})")]
    Transport {
        provider: &'static str,
        kind: &'static str,
    },
    #[error("{provider} returned HTTP {status}")]
    HttpStatus { provider: &'static str, status: u16 },
    #[error("{provider} response could not be parsed: {detail}")]
    Parse {
        provider: &'static str,
        detail: String,
    },
    #[error("{provider} returned no result")]
    NoResult { provider: &'static str },
    #[error("{provider} is not configured: {detail}")]
    NotConfigured {
        provider: &'static str,
        detail: String,
    },
}

impl ProviderError {
    pub fn parse(provider: &'static str, detail: impl Into<String>) -> Self {
        ProviderError::Parse {
            provider,
            detail: detail.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout { .. })
    }
}

pub trait RoutingProvider: Send + Sync {
    /// Tag stamped on every route this backend produces.
    fn engine_tag(&self) -> EngineTag;

    fn compute_route(
        &self,
        start: GeoPoint,
        end: GeoPoint,
        mode: RoutingMode,
    ) -> Result<Route, ProviderError>;
}

pub trait PlaceProvider: Send + Sync {
    fn search(
        &self,
        query: &str,
        near: Option<GeoPoint>,
        radius_m: Option<f64>,
    ) -> Result<Vec<PlaceCandidate>, ProviderError>;

    /// `Ok(None)` when the backend knows no address for the point.
    fn reverse(&self, at: GeoPoint) -> Result<Option<String>, ProviderError>;
}

/// One encoded camera frame (JPEG or PNG).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionFrame {
    pub bytes: Vec<u8>,
}

impl VisionFrame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn mime_type(&self) -> &'static str {
        if self.bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else {
            "image/jpeg"
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VisionContext<'a> {
    /// Spoken text of the active route instruction, if navigating.
    pub route_instruction: Option<&'a str>,
    /// Free-form context supplied by the client with the frame.
    pub client_context: Option<&'a str>,
}

pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn analyze(
        &self,
        frame: &VisionFrame,
        context: VisionContext<'_>,
    ) -> Result<VisionAnalysis, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechPriority {
    Normal,
    High,
}

pub trait SpeechProvider: Send + Sync {
    fn speak(&self, text: &str, priority: SpeechPriority) -> Result<(), ProviderError>;
}
