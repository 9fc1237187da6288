//! Content-aware one-way directory synchronizer.
//!
//! The reconciliation engine lives in [`driver`], built on the path
//! normalizer ([`path`]), the content fingerprinter ([`fingerprint`]), the
//! ignore matcher ([`ignore`]), and the destination index ([`index`]).
//! [`cli`], [`settings`], and [`log`] are the external collaborators that
//! produce a [`config::Config`] and a logging sink for the driver to consume.

pub mod cli;
pub mod config;
pub mod driver;
pub mod fingerprint;
pub mod ignore;
pub mod index;
pub mod io;
pub mod log;
pub mod path;
pub mod settings;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
