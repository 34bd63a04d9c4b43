//! Flagsmith user group reconciler with its organisation permissions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{Converger, Reconciler, State, attr_str};
use crate::clients::{Flagsmith, with_query};
use crate::error::Result;
use crate::outcome::Outcome;
use crate::paginate::PageShape;
use crate::payload::{AttributeDiffer, Attributes, FieldStrategy, to_attributes};
use crate::resource::{Projection, RemoteId};

const FIELDS: &[&str] = &["name", "users", "is_default"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGroupSpec {
    #[serde(skip_serializing)]
    pub state: State,
    #[serde(skip_serializing)]
    pub organisation_name: String,
    pub name: String,
    pub users: Option<Vec<i64>>,
    pub is_default: Option<bool>,
    #[serde(skip_serializing, default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    pub organisation: Option<PermissionSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSet {
    #[serde(default)]
    pub permissions: Vec<String>,
}

pub struct UserGroupReconciler<'a> {
    client: &'a Flagsmith<'a>,
}

impl<'a> UserGroupReconciler<'a> {
    pub fn new(client: &'a Flagsmith<'a>) -> Self {
        Self { client }
    }

    /// Converge the organisation-level permissions of `group`.
    ///
    /// The permission listing is a bare array filtered by group; its first
    /// element is the current record. `group` is always part of the write
    /// payload.
    fn reconcile_permissions(
        &self,
        organisation: &RemoteId,
        group: &RemoteId,
        wanted: &PermissionSet,
    ) -> Result<bool> {
        let collection = self.client.group_permissions(organisation);
        let converger = Converger::new(
            self.client.api(),
            "user group permissions",
            collection.clone(),
            PageShape::BareArray,
            Projection::Flat(&["permissions"]),
        );
        let group_key = group.to_string();
        let start = with_query(&collection, &[("group", group_key.as_str())])?;
        let remote = converger.locate(&start, |_| true)?;

        let mut desired = Attributes::new();
        desired.insert("permissions".to_string(), Value::from(wanted.permissions.clone()));

        let Some(remote) = remote else {
            desired.insert("group".to_string(), group.to_numeric());
            converger.create(&desired)?;
            return Ok(true);
        };

        let mut diff = AttributeDiffer::new()
            .field("permissions", FieldStrategy::UnorderedSet)
            .diff(&desired, &remote.attributes);
        if diff.is_empty() {
            info!("Permissions of group {} are up to date", group);
            return Ok(false);
        }
        diff.insert("group".to_string(), group.to_numeric());
        converger.update(&remote.id, &diff)?;
        Ok(true)
    }
}

impl Reconciler for UserGroupReconciler<'_> {
    type Spec = UserGroupSpec;

    fn reconcile(&self, spec: &UserGroupSpec) -> Result<Outcome> {
        info!(
            "Reconciling user group {} in {}",
            spec.name, spec.organisation_name
        );
        let organisation = self.client.organisation_id(&spec.organisation_name)?;
        let collection = self.client.groups(&organisation);
        let converger = self
            .client
            .converger("user_group", collection.clone(), FIELDS);

        let remote = converger.locate(&collection, |group| {
            attr_str(&group.attributes, "name") == Some(spec.name.as_str())
        })?;

        let desired = to_attributes(spec)?;
        let converged = converger.converge(spec.state, &desired, remote)?;
        let mut changed = converged.changed();

        if spec.state == State::Present
            && let Some(wanted) = spec.permissions.as_ref().and_then(|p| p.organisation.as_ref())
        {
            let group = converger.resolved_id(&converged)?;
            changed |= self.reconcile_permissions(&organisation, &group, wanted)?;
        }

        let mut outcome = converged.to_outcome("user_group");
        outcome.changed = changed;
        Ok(outcome)
    }
}
