//! Infrastructure artifact generation.
//!
//! Everything here is templating over the resolved defaults record: build
//! and run shell scripts, the resource-provisioning flavors (gcloud shell,
//! Terraform, Pulumi), the Cloud Build configuration and the optional
//! Cloud Run / queueing services.

pub mod cloudbuild;
pub mod pulumi;
pub mod scripts;
pub mod services;
pub mod terraform;

pub use scripts::ScriptsBuilder;
