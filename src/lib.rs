//! Kubernetes operator that turns `ClusterLogForwarder` resources into a running log collector.

#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod api;
pub mod app;
pub mod cli;
pub mod comparators;
pub mod config;
pub mod controller;
pub mod error;
pub mod generate;
pub mod generator;
pub mod kubernetes;
pub mod quantity;
pub mod reconcile;
pub mod secrets;
pub mod signal;
pub mod telemetry;
pub mod trace;
pub mod validation;

pub use error::{Error, Result};

pub fn get_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION");
    let build_desc = option_env!("OPERATOR_BUILD_DESC");
    match build_desc {
        Some(desc) => format!("{pkg_version} ({desc})"),
        None => pkg_version.to_owned(),
    }
}
