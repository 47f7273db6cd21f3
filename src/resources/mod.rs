//! Kubernetes resources backing a cluster.
//!
//! | Resource | Used for |
//! |----------|----------|
//! | Pod | Ready node discovery |
//! | StatefulSet | Current replica count and scaling |
//! | Secret | Store password |

pub mod common;
pub mod kube_providers;

pub use common::{FIELD_MANAGER, pod_selector, pod_selector_labels};
pub use kube_providers::{PodMembership, SecretPassword, StatefulSetReplicas};
