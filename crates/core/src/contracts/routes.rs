//! URL layout of the remote contract endpoints.

use crate::sync::url_is_under;

/// Builds target URLs for contract requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRoutes {
    base_url: String,
}

impl ContractRoutes {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET the snapshot, PATCH block content.
    pub fn contract(&self, contract_id: &str) -> String {
        format!("{}/api/contracts/{}", self.base_url, contract_id)
    }

    /// PATCH the contract status.
    pub fn contract_status(&self, contract_id: &str) -> String {
        format!("{}/api/contracts/{}/status", self.base_url, contract_id)
    }

    /// GET all contracts of a job.
    pub fn job_contracts(&self, job_id: &str) -> String {
        format!("{}/api/jobs/{}/contracts", self.base_url, job_id)
    }

    /// True when `target_url` addresses `contract_id` or one of its
    /// sub-resources.
    pub fn targets_contract(&self, target_url: &str, contract_id: &str) -> bool {
        url_is_under(target_url, &self.contract(contract_id))
    }
}
