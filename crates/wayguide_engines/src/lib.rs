#![forbid(unsafe_code)]

pub mod geometry;
pub mod guidance;
pub mod narration;
pub mod progress;
pub mod providers;
pub mod response_cache;
pub mod route_cache;
pub mod throttle;
pub mod ttl_cache;
