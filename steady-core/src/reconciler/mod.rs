//! Reconcilers for the different resource kinds.
//!
//! Each reconciler locates the remote resource by its natural key, compares
//! it with the desired state, and issues the calls needed to converge.

pub mod feature;
pub mod monitor;
pub mod sections;
pub mod segment;
pub mod segment_priority;
pub mod status_page;
pub mod tag;
pub mod user_group;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::clients::{ApiClient, expect_status};
use crate::error::{ReconcileError, Result};
use crate::outcome::Outcome;
use crate::paginate::{PageShape, Paginator};
use crate::payload::{AttributeDiffer, Attributes};
use crate::resource::{Projection, RemoteId, RemoteResource};

/// Trait for resource reconcilers.
pub trait Reconciler {
    /// The declarative input.
    type Spec;

    /// Converge the remote resource described by `spec`.
    fn reconcile(&self, spec: &Self::Spec) -> Result<Outcome>;
}

/// Desired presence of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    Present,
    Absent,
}

const CREATED: u16 = 201;
const OK: u16 = 200;
const NO_CONTENT: u16 = 204;

/// What a single convergence step did.
#[derive(Debug, Clone, PartialEq)]
pub enum Converged {
    /// Created; the id is `None` when the response did not carry one.
    Created { id: Option<RemoteId> },
    Updated { id: RemoteId, diff: Attributes },
    Unchanged { id: RemoteId },
    Deleted { id: RemoteId },
    /// Desired absent and nothing to delete.
    AlreadyAbsent,
}

impl Converged {
    pub fn changed(&self) -> bool {
        matches!(
            self,
            Converged::Created { .. } | Converged::Updated { .. } | Converged::Deleted { .. }
        )
    }

    /// Id of the resource after the step, when it still exists.
    pub fn id(&self) -> Option<&RemoteId> {
        match self {
            Converged::Created { id } => id.as_ref(),
            Converged::Updated { id, .. } | Converged::Unchanged { id } => Some(id),
            Converged::Deleted { .. } | Converged::AlreadyAbsent => None,
        }
    }

    pub fn to_outcome(&self, noun: &str) -> Outcome {
        let outcome = match self {
            Converged::AlreadyAbsent => {
                return Outcome::unchanged().with_msg(format!("No {noun} to delete"));
            }
            Converged::Unchanged { .. } => Outcome::unchanged(),
            _ => Outcome::changed(),
        };
        match self.id() {
            Some(id) => outcome.with("id", id.as_value().clone()),
            None => outcome,
        }
    }
}

/// The present/absent state machine for one resource kind.
///
/// Item URLs derive from the collection URL: `<collection>/<id>`, or
/// `<collection><id>/` when the collection ends with a slash (Flagsmith).
pub struct Converger<'a> {
    api: &'a ApiClient<'a>,
    noun: &'static str,
    collection: String,
    shape: PageShape,
    projection: Projection,
    differ: AttributeDiffer,
}

impl<'a> Converger<'a> {
    pub fn new(
        api: &'a ApiClient<'a>,
        noun: &'static str,
        collection: impl Into<String>,
        shape: PageShape,
        projection: Projection,
    ) -> Self {
        Self {
            api,
            noun,
            collection: collection.into(),
            shape,
            projection,
            differ: AttributeDiffer::new(),
        }
    }

    pub fn with_differ(mut self, differ: AttributeDiffer) -> Self {
        self.differ = differ;
        self
    }

    /// Id of the resource after `converged`; a create answered without one is an error.
    pub fn resolved_id(&self, converged: &Converged) -> Result<RemoteId> {
        converged.id().cloned().ok_or_else(|| {
            ReconcileError::decode(&self.collection, format!("created {} without an id", self.noun))
        })
    }

    pub fn item_url(&self, id: &RemoteId) -> String {
        if self.collection.ends_with('/') {
            format!("{}{}/", self.collection, id)
        } else {
            format!("{}/{}", self.collection, id)
        }
    }

    /// First resource from `start_url` onwards whose projection satisfies `matches`.
    pub fn locate(
        &self,
        start_url: &str,
        mut matches: impl FnMut(&RemoteResource) -> bool,
    ) -> Result<Option<RemoteResource>> {
        let projection = self.projection;
        let found = Paginator::new(self.api, self.shape).find_first(start_url, |item| {
            projection.project(item).is_some_and(|res| matches(&res))
        })?;
        Ok(found.and_then(|item| projection.project(&item)))
    }

    /// Fetch a single resource by id; `None` on 404.
    pub fn fetch(&self, id: &RemoteId) -> Result<Option<RemoteResource>> {
        let url = self.item_url(id);
        let response = self.api.get(&url)?;
        if response.status == 404 {
            return Ok(None);
        }
        let response = expect_status(response, OK, &format!("get {} {}", self.noun, id))?;
        let item = match (self.projection, response.body.as_ref()) {
            (Projection::JsonApi, Some(body)) => body.get("data").cloned(),
            (Projection::Flat(_), body) => body.cloned(),
            (Projection::JsonApi, None) => None,
        };
        Ok(item.as_ref().and_then(|item| self.projection.project(item)))
    }

    pub fn create(&self, payload: &Attributes) -> Result<Option<RemoteId>> {
        info!("Creating {}", self.noun);
        let response = self.api.post(&self.collection, &Value::Object(payload.clone()))?;
        let response = expect_status(response, CREATED, &format!("create {}", self.noun))?;
        Ok(self.projection.created_id(response.body.as_ref()))
    }

    pub fn update(&self, id: &RemoteId, payload: &Attributes) -> Result<()> {
        info!(
            "Updating {} {} ({})",
            self.noun,
            id,
            payload.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        let response = self
            .api
            .patch(&self.item_url(id), &Value::Object(payload.clone()))?;
        expect_status(response, OK, &format!("update {} {}", self.noun, id))?;
        Ok(())
    }

    pub fn delete(&self, id: &RemoteId) -> Result<()> {
        info!("Deleting {} {}", self.noun, id);
        let response = self.api.delete(&self.item_url(id))?;
        expect_status(response, NO_CONTENT, &format!("delete {} {}", self.noun, id))?;
        Ok(())
    }

    /// Apply the transition for `state` given what the lookup found.
    pub fn converge(
        &self,
        state: State,
        desired: &Attributes,
        remote: Option<RemoteResource>,
    ) -> Result<Converged> {
        match (state, remote) {
            (State::Present, None) => Ok(Converged::Created {
                id: self.create(desired)?,
            }),
            (State::Present, Some(remote)) => {
                let diff = self.differ.diff(desired, &remote.attributes);
                if diff.is_empty() {
                    info!("{} {} is up to date", self.noun, remote.id);
                    return Ok(Converged::Unchanged { id: remote.id });
                }
                self.update(&remote.id, &diff)?;
                Ok(Converged::Updated {
                    id: remote.id,
                    diff,
                })
            }
            (State::Absent, Some(remote)) => {
                self.delete(&remote.id)?;
                Ok(Converged::Deleted { id: remote.id })
            }
            (State::Absent, None) => {
                info!("No {} to delete", self.noun);
                Ok(Converged::AlreadyAbsent)
            }
        }
    }
}

/// String form of a scalar attribute, for natural-key comparison.
pub(crate) fn attr_str<'v>(attributes: &'v Attributes, key: &str) -> Option<&'v str> {
    attributes.get(key).and_then(Value::as_str)
}

/// Textual form of a string or number, `None` for anything else.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_converged_outcomes() {
        let created = Converged::Created {
            id: Some(RemoteId::from("9")),
        };
        assert!(created.changed());
        assert_eq!(created.to_outcome("monitor").data["id"], json!("9"));

        let unchanged = Converged::Unchanged {
            id: RemoteId::from(3),
        };
        assert!(!unchanged.changed());
        assert!(!unchanged.to_outcome("tag").changed);

        let absent = Converged::AlreadyAbsent.to_outcome("tag");
        assert!(!absent.changed);
        assert_eq!(absent.msg.as_deref(), Some("No tag to delete"));

        assert!(Converged::Deleted { id: RemoteId::from(1) }.changed());
        assert_eq!(Converged::Deleted { id: RemoteId::from(1) }.id(), None);
    }

    #[test]
    fn test_state_deserializes_lowercase() {
        let state: State = serde_json::from_value(json!("absent")).unwrap();
        assert_eq!(state, State::Absent);
        assert!(serde_json::from_value::<State>(json!("gone")).is_err());
    }

    #[test]
    fn test_scalar_text() {
        assert_eq!(scalar_text(&json!("443")), Some("443".to_string()));
        assert_eq!(scalar_text(&json!(443)), Some("443".to_string()));
        assert_eq!(scalar_text(&json!(null)), None);
    }
}
