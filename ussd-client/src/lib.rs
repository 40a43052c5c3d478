//! # ussd-client: USSD gateway client
//!
//! Runs one session of the `ussd-core` client against the configured
//! gateway: log on, keep the link alive and answer dialog events through
//! the HTTP menu service until Ctrl-C or a fatal link error.
//!
//! Configuration is a TOML file with environment overrides; see
//! [`config::ClientConfig`].

pub mod config;
pub mod logging;
pub mod service;
