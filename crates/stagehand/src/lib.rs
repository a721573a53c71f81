//! # Stagehand
//!
//! Stagehand decides which declared infrastructure resources ship with a
//! deployment. A service manifest may declare many resources, only some of
//! which belong in every deployment target: a replication bucket that only
//! exists in one region, an alarm topic that only makes sense in production.
//! Stagehand lets each resource definition carry `regions` and `stages`
//! allow-lists, and prunes the live configuration down to the resources
//! enabled for the concrete target of the current run.
//!
//! ## Key Features
//!
//! - **Target-keyed selection**: resources opt in to regions and stages; a
//!   deployment keeps exactly the resources enabled for its target.
//! - **Policy hygiene**: when a resource is dropped for the target stage,
//!   references to it are swept out of the provider's access-policy
//!   statements so the emitted template stays consistent.
//! - **Clean templates**: surviving resources are emitted without their
//!   selection metadata, so downstream template generation never sees it.
//!
//! ## Concepts
//!
//! Stagehand operates on two structures owned by the host's live
//! configuration object, both mutated in place:
//!
//! - The **resource map** of the [`Service`](service::Service)'s stack: the
//!   declared resource definitions, keyed by name.
//! - The provider's **access-policy statement list**, whose resource
//!   references must stay consistent with which resources survive.
//!
//! Selection runs once per deployment invocation, triggered from the host's
//! lifecycle hooks (see [`HookPoint`](select::HookPoint)). The pass is a
//! one-shot filter with no cross-call state: every combination of present or
//! absent restrictions and context fields degrades to either "keep" or
//! "drop", never to an error.
//!
//! An example command-line host can be found in `crates/stagehand-example`.
//!
//! ## Error Handling
//!
//! The selection pass itself is infallible. Errors only arise in the
//! manifest and template I/O around it, and are collected in the [`Error`]
//! enum. Functions that can fail return a `Result` with this [`Error`].

pub mod select;
pub mod service;

pub use select::{
    select_all, select_one, DeployContext, HookPoint, SelectResource, SelectedResource, Selection,
    SelectionReport,
};
pub use service::{
    PolicyStatement, Provider, ResourceDef, ResourceMap, Restriction, Service, Stack,
};

/// Top-level error enum that encompasses all errors.
#[derive(snafu::Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Could not read service manifest '{path:?}': {source}"))]
    ManifestRead {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse service manifest '{path:?}': {source}"))]
    ManifestParse {
        path: std::path::PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display("Could not serialize the deployment template for '{service}': {source}"))]
    TemplateSerialize {
        service: String,
        source: serde_json::Error,
    },

    #[snafu(display("Could not create file {path:?}: {source}"))]
    CreateFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not write file {path:?}: {source}"))]
    WriteFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
