#![forbid(unsafe_code)]

pub mod clock;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::NavigationError;
pub use registry::SessionRegistry;
pub use session::{NavigationServices, NavigationSession, SessionConfig};
