//! Full-node consensus host for the Helix network.
//!
//! The crate embeds a BFT replicated-state-machine engine behind the
//! contracts in [`engine`], multiplexes an application layer over it via
//! [`mux`], and exposes the replicated ledger to the domain subsystems
//! wired up in [`services`]. The [`host`] module composes the lifecycle:
//! lazy construction, genesis-driven configuration, two-phase start
//! (multiplexer → engine → service clients), and shutdown.
//!
//! Consumers typically build a [`config::HostConfig`], load an
//! [`crypto::Identity`], and operate the node through [`host::Host`].

pub mod config;
pub mod crypto;
pub mod engine;
pub mod errors;
pub mod genesis;
pub mod host;
pub mod monitor;
pub mod mux;
pub mod pubsub;
pub mod services;
pub mod submission;
pub mod supervisor;
pub mod transaction;
pub mod types;

pub use errors::{HostError, HostResult};
pub use host::{Host, HostDependencies};
