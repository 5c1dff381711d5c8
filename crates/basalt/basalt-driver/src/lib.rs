//! `basalt-driver`: the client's view of the media driver.
//!
//! Three pieces make up the driver boundary:
//!
//! - [`CncFile`]: typed overlay of the counters/command-and-control file the
//!   driver exposes, giving out views of the to-driver ring, the to-clients
//!   broadcast region, the counter regions and the error log.
//! - [`commands`] / [`responses`]: the flyweight codecs and stable type codes
//!   of every message crossing the two rings. Layouts are bit-exact contracts
//!   with the driver.
//! - [`DriverProxy`]: encodes commands into the to-driver ring and allocates
//!   correlation ids from the counter the driver shares with every client.

pub mod commands;
pub mod responses;

mod cnc;
mod proxy;

pub use cnc::{CncError, CncFile, CncLengths, CNC_VERSION};
pub use proxy::DriverProxy;
