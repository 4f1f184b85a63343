//! CRD self-installation
//!
//! The operator installs its own CRDs on startup using server-side apply so
//! the CRD versions always match the operator version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use fga_common::crd::{AuthorizationModel, AuthorizationModelRequest, Store};

/// Apply all operator CRDs
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("fga-operator").force();

    for crd in [
        AuthorizationModelRequest::crd(),
        AuthorizationModel::crd(),
        Store::crd(),
    ] {
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("generated CRD has no name"))?;
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    Ok(())
}
