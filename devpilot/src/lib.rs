//! DevPilot
//!
//! Deploys Node.js applications to a remote host over ssh and streams the
//! deployment output back to the caller as it happens.

pub mod app;
pub mod client;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod orchestrator;
pub mod projects;
pub mod protocol;
pub mod remote;
pub mod server;
pub mod storage;
pub mod stream;
pub mod utils;
