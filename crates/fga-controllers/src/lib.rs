//! Reconciliation controllers for the FGA operator
//!
//! Two loops share a reconcile key (name + namespace):
//!
//! - [`request_controller`] drives the desired state: it ensures the external
//!   store exists, publishes missing model versions to the permission engine,
//!   and maintains the `AuthorizationModel` history resource.
//! - [`model_controller`] drives the observed state into workloads: for every
//!   deployment labelled with the store it resolves the bound model version
//!   and rewrites container env vars and annotations.

#![deny(missing_docs)]

pub mod deployment_operations;
pub mod model_controller;
pub mod request_controller;
