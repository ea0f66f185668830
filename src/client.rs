//! Kubernetes API access for claim reconciliation
//!
//! [`ClaimClient`] abstracts the three calls the reconciler needs so tests can
//! swap in a mock. Not-found and already-exists come back as ordinary values,
//! so `Err` always means a transient or unexpected API failure.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// Outcome of a read that may legitimately find nothing
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup<T> {
    /// The object exists
    Found(T),
    /// The API server answered 404
    NotFound,
}

/// Outcome of a create call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call created the object
    Created,
    /// Another writer created it first (HTTP 409)
    AlreadyExists,
}

/// Trait abstracting the Kubernetes calls made during claim reconciliation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClaimClient: Send + Sync {
    /// Get a PersistentVolumeClaim by namespace and name
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Lookup<PersistentVolumeClaim>, Error>;

    /// Create a PersistentVolumeClaim in the given namespace
    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<CreateOutcome, Error>;

    /// Get the StatefulSet that owns a Pod
    async fn get_workload(&self, namespace: &str, name: &str)
        -> Result<Lookup<StatefulSet>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClaimClient {
    client: Client,
}

impl KubeClaimClient {
    /// Create a new KubeClaimClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClaimClient for KubeClaimClient {
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Lookup<PersistentVolumeClaim>, Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(claim) => Ok(Lookup::Found(claim)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(Lookup::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_claim(
        &self,
        namespace: &str,
        claim: &PersistentVolumeClaim,
    ) -> Result<CreateOutcome, Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        match api.create(&PostParams::default(), claim).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Lookup<StatefulSet>, Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(sts) => Ok(Lookup::Found(sts)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(Lookup::NotFound),
            Err(e) => Err(e.into()),
        }
    }
}
