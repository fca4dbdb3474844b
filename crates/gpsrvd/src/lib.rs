// # gpsrvd
//
// Daemon for the GPSrv provisioning service: environment configuration
// and the HTTP surface. The binary in `main.rs` wires these to the core
// services and runs the server.

pub mod config;
pub mod http;

pub use config::Config;
pub use http::{ApiState, router};
