//! # Custodia Core — foundation for the data-protection policy engine
//!
//! Shared vocabulary, error taxonomy, and the injectable collaborators the
//! engine is built against: clock, key provider, alert sink, and a
//! cancellable periodic scheduler. Every engine component links against
//! this crate; none of them hold process-wide singleton state.

pub mod alert;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod scheduler;
pub mod types;

pub use alert::{AlertSink, MemoryAlertSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{CustodiaError, CustodiaResult};
pub use keys::{KeyProvider, StaticKeyProvider};
pub use scheduler::PeriodicTask;
