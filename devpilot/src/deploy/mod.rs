//! Deployment requests, commands and status

pub mod command;
pub mod config;
pub mod fsm;
pub mod lifecycle;
