//! Workload identity lookups against the orchestrator's metadata API.

pub mod directory;
pub mod pod;

pub use directory::{
    is_dns_label, is_dns_subdomain, DirectoryError, KubeApiDirectory, WorkloadDirectory,
    DEFAULT_KUBE_API,
};
pub use pod::{
    Pod, PodMetadata, PodStatus, Workload, DEFAULT_TTL, POLICIES_ANNOTATION, TTL_ANNOTATION,
};
