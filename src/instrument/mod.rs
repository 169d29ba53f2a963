//! Instrument command channels.
//!
//! The measurement session talks to an analyzer only through the [`Channel`]
//! trait. Implementations:
//!
//! - [`VisaChannel`]: real hardware through a VISA library (`instrument_visa` feature)
//! - [`SimulatedVna`]: software analyzer with a synthetic two-port network
//! - [`MockChannel`]: scripted responses and failure injection for tests
//!
//! [`CommandSet`] holds the SCPI templates the session renders.

pub mod channel;
pub mod commands;
pub mod mock;
pub mod simulated;
pub mod visa;

pub use channel::{parse_real_list, Channel};
pub use commands::CommandSet;
pub use mock::MockChannel;
pub use simulated::{SimulatedVna, SIMULATED_RESOURCE};
pub use visa::VisaChannel;
