use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Annotation listing the comma-separated policies a workload may hold.
pub const POLICIES_ANNOTATION: &str = "vaultproject.io/policies";

/// Annotation overriding the credential TTL.
pub const TTL_ANNOTATION: &str = "vaultproject.io/ttl";

/// TTL used when a workload carries no TTL annotation.
pub const DEFAULT_TTL: &str = "72h";

/// The subset of the orchestrator's pod object this system reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default)]
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, rename = "podIP")]
    pub pod_ip: String,
    #[serde(default, rename = "hostIP")]
    pub host_ip: String,
}

/// A workload's identity as resolved for one credential request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub pod_ip: String,
    pub host_ip: String,
    pub annotations: BTreeMap<String, String>,
}

impl From<Pod> for Workload {
    fn from(pod: Pod) -> Self {
        Self {
            kind: pod.kind,
            name: pod.metadata.name,
            namespace: pod.metadata.namespace,
            uid: pod.metadata.uid,
            pod_ip: pod.status.pod_ip,
            host_ip: pod.status.host_ip,
            annotations: pod.metadata.annotations,
        }
    }
}

impl Workload {
    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Policies from the policy annotation, split on commas. `None` when
    /// the annotation is missing or empty.
    pub fn policies(&self) -> Option<Vec<String>> {
        self.annotation(POLICIES_ANNOTATION)
            .map(|value| value.split(',').map(str::to_string).collect())
    }

    /// TTL annotation or [`DEFAULT_TTL`].
    pub fn ttl(&self) -> &str {
        self.annotation(TTL_ANNOTATION).unwrap_or(DEFAULT_TTL)
    }

    /// Metadata attached to tokens minted for this workload.
    pub fn token_metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("host_ip".to_string(), self.host_ip.clone()),
            ("namespace".to_string(), self.namespace.clone()),
            ("pod_ip".to_string(), self.pod_ip.clone()),
            ("pod_name".to_string(), self.name.clone()),
            ("pod_uid".to_string(), self.uid.clone()),
        ])
    }
}
