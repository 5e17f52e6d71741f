//! Resource generation module.
//!
//! Contains utilities for generating the Kubernetes resources owned by a
//! PrometheusReplica.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | Collector StatefulSet | Prometheus with a Thanos sidecar |
//! | Peers Service | Headless gossip discovery for the mesh |
//! | Store StatefulSet | Thanos store over the object bucket |
//! | Store Service | Store endpoint |
//! | Query Deployment | Thanos query aggregation |
//! | Query Service | Aggregation endpoint reported in status |

pub mod common;
pub mod deployment;
pub mod descriptor;
pub mod services;
pub mod statefulset;
pub mod topology;

pub use common::{TopologyRole, link, owner_reference};
pub use descriptor::ResourceDescriptor;
pub use topology::generate;
