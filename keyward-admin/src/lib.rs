//! Command dispatcher for the Keyward license ledger.
//!
//! Resolves who the caller is allowed to be, runs the command against a
//! [`LicenseService`](keyward_license::LicenseService), and renders the
//! outcome as reply text. The binary in `main.rs` wires this to the command
//! line.

pub mod access;
pub mod config;
pub mod dispatch;
pub mod relay;
pub mod render;

pub use access::{AccessPolicy, Capability};
pub use config::{AccessConfig, AdminConfig};
pub use dispatch::{dispatch, Command, ConfirmArgs};
pub use relay::parse_relay_message;
