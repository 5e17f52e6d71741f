//! Label-based discovery of the live topology.

use std::collections::BTreeMap;

use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::controller::store::{ObjectKind, ObjectStore};
use crate::resources::TopologyRole;

/// Roles whose pods are reported in status.
pub const POD_ROLES: [TopologyRole; 3] = [
    TopologyRole::PrometheusPods,
    TopologyRole::ThanosStore,
    TopologyRole::ThanosQuery,
];

/// Roles whose services are reported in status.
pub const SERVICE_ROLES: [TopologyRole; 2] = [TopologyRole::ThanosQuery, TopologyRole::Grafana];

/// One role and the selector that finds its objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleQuery {
    pub role: TopologyRole,
    pub selector: String,
}

impl RoleQuery {
    /// Query for `role` under the instance `name`.
    ///
    /// The selector is rendered from the same label set the generators stamp.
    pub fn new(role: TopologyRole, name: &str) -> Self {
        Self {
            role,
            selector: role.selector(name),
        }
    }
}

/// Role queries for the instance `name`.
pub fn role_queries(roles: &[TopologyRole], name: &str) -> Vec<RoleQuery> {
    roles.iter().map(|role| RoleQuery::new(*role, name)).collect()
}

/// Names of live objects per role, rebuilt every pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub pods: BTreeMap<TopologyRole, Vec<String>>,
    pub services: BTreeMap<TopologyRole, Vec<String>>,
}

impl ObservedState {
    pub fn pods_of(&self, role: TopologyRole) -> &[String] {
        self.pods.get(&role).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn services_of(&self, role: TopologyRole) -> &[String] {
        self.services.get(&role).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Run every query against `namespace` and group the names by role.
///
/// The first failing query aborts the whole observation with
/// [`Error::Observe`]; no partial result is returned.
pub async fn observe<S: ObjectStore>(
    store: &S,
    kind: ObjectKind,
    queries: &[RoleQuery],
    namespace: &str,
) -> Result<BTreeMap<TopologyRole, Vec<String>>> {
    let mut observed = BTreeMap::new();
    for query in queries {
        let names = store
            .list_names(kind, namespace, &query.selector)
            .await
            .map_err(|source| Error::Observe {
                role: query.role,
                kind: kind.as_str(),
                source,
            })?;
        debug!(
            role = %query.role,
            kind = %kind,
            names = ?names,
            "Observed role"
        );
        observed.insert(query.role, names);
    }
    Ok(observed)
}

/// Observe the pod roles and the service roles of the instance `name`.
pub async fn observe_instance<S: ObjectStore>(
    store: &S,
    name: &str,
    namespace: &str,
) -> Result<ObservedState> {
    let pods = observe(store, ObjectKind::Pod, &role_queries(&POD_ROLES, name), namespace).await?;
    let services = observe(
        store,
        ObjectKind::Service,
        &role_queries(&SERVICE_ROLES, name),
        namespace,
    )
    .await?;
    Ok(ObservedState { pods, services })
}
