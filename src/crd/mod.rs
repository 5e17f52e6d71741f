//! Custom Resource Definitions (CRDs) for prometheus-replica-operator.
//!
//! - `PrometheusReplica`: Deploy a Prometheus + Thanos topology for one instance

mod prometheus_replica;

pub use prometheus_replica::*;
