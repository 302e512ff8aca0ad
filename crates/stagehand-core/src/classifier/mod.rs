//! Classification API client.
//!
//! [`ClassificationApi`] is the raw wire contract. [`Classifier`] layers the
//! operations the orchestrator uses on top of it, every mutation guarded by a
//! read-compare-skip check: writes trigger configuration propagation on other
//! nodes, and the orchestrator is re-run against partially configured clusters.

mod http;
mod schema;
mod topology;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub use http::HttpClassifier;
pub use schema::{ClassParams, Classes, Group, NewGroup, pin_rule};
pub use topology::{GroupSetting, PoolTopology};

/// Whether a guarded operation wrote anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

impl Outcome {
    pub fn changed(&self) -> bool {
        matches!(self, Outcome::Changed)
    }

    pub fn or(self, other: Outcome) -> Outcome {
        if self.changed() || other.changed() {
            Outcome::Changed
        } else {
            Outcome::Unchanged
        }
    }
}

/// The classification REST contract. Every method maps to one request; the
/// three mutating ones are `POST`s.
pub trait ClassificationApi {
    /// `GET /groups`
    fn list_groups(&self) -> Result<Vec<Group>>;

    /// `POST /groups`
    fn create_group(&self, group: &NewGroup) -> Result<Group>;

    /// `POST /groups/{id}` replacing the group's classes.
    fn update_classes(&self, group_id: &str, classes: &Classes) -> Result<()>;

    /// `POST /groups/{id}/pin?nodes={subject}`
    fn pin_node(&self, group_id: &str, subject: &str) -> Result<()>;
}

/// Name, rule and classes of a group to create under the root group.
#[derive(Debug, Clone)]
pub struct GroupDefinition {
    pub name: String,
    pub rule: Value,
    pub classes: Classes,
}

/// Orchestrator-level operations over a [`ClassificationApi`].
pub struct Classifier<'a> {
    api: &'a dyn ClassificationApi,
    environment: String,
    root_group: String,
}

impl<'a> Classifier<'a> {
    pub fn new(
        api: &'a dyn ClassificationApi,
        environment: impl Into<String>,
        root_group: impl Into<String>,
    ) -> Self {
        Self {
            api,
            environment: environment.into(),
            root_group: root_group.into(),
        }
    }

    /// The group named `name`, or `None`. More than one match is an error.
    pub fn find_group(&self, name: &str) -> Result<Option<Group>> {
        let mut matches: Vec<Group> = self
            .api
            .list_groups()?
            .into_iter()
            .filter(|group| group.name == name)
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(Error::AmbiguousGroup {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Id of the single group named `name`.
    pub fn find_group_id(&self, name: &str) -> Result<String> {
        self.find_group(name)?
            .map(|group| group.id)
            .ok_or_else(|| Error::GroupNotFound {
                name: name.to_string(),
            })
    }

    pub fn group(&self, group_id: &str) -> Result<Group> {
        self.api
            .list_groups()?
            .into_iter()
            .find(|group| group.id == group_id)
            .ok_or_else(|| Error::GroupIdNotFound {
                id: group_id.to_string(),
            })
    }

    pub fn get_class_param(
        &self,
        group_id: &str,
        class: &str,
        param: &str,
    ) -> Result<Option<Value>> {
        Ok(self.group(group_id)?.class_param(class, param).cloned())
    }

    /// Pin `subject` into the group unless it is already pinned.
    pub fn pin_node(&self, group_id: &str, subject: &str) -> Result<Outcome> {
        if self.group(group_id)?.is_pinned(subject) {
            debug!(group_id, subject, "already pinned");
            return Ok(Outcome::Unchanged);
        }
        self.api.pin_node(group_id, subject)?;
        info!(group_id, subject, "pinned node");
        Ok(Outcome::Changed)
    }

    /// Merge `classes` over the group's current classes and write the result.
    pub fn set_class_params(&self, group_id: &str, classes: &Classes) -> Result<()> {
        let mut merged = self.group(group_id)?.classes;
        for (class, params) in classes {
            let entry = merged.entry(class.clone()).or_default();
            for (param, value) in params {
                entry.insert(param.clone(), value.clone());
            }
        }
        self.api.update_classes(group_id, &merged)?;
        info!(group_id, "updated class parameters");
        Ok(())
    }

    /// Create a group under the root group.
    pub fn create_group(&self, definition: GroupDefinition) -> Result<Group> {
        let parent = self.find_group_id(&self.root_group)?;
        let group = self.api.create_group(&NewGroup {
            name: definition.name,
            environment: self.environment.clone(),
            parent,
            rule: definition.rule,
            classes: definition.classes,
        })?;
        info!(group = group.name, id = group.id, "created classification group");
        Ok(group)
    }

    /// The group named `definition.name`, created if absent.
    pub fn ensure_group(&self, definition: GroupDefinition) -> Result<(Group, Outcome)> {
        match self.find_group(&definition.name)? {
            Some(group) => Ok((group, Outcome::Unchanged)),
            None => Ok((self.create_group(definition)?, Outcome::Changed)),
        }
    }

    /// Write `params` on `class` only if any current value differs.
    pub fn ensure_class_params(
        &self,
        group_id: &str,
        class: &str,
        params: &ClassParams,
    ) -> Result<Outcome> {
        let mut consistent = true;
        for (param, desired) in params {
            if self.get_class_param(group_id, class, param)?.as_ref() != Some(desired) {
                consistent = false;
                break;
            }
        }
        if consistent {
            debug!(group_id, class, "class parameters already consistent");
            return Ok(Outcome::Unchanged);
        }

        let mut classes = Classes::new();
        classes.insert(class.to_string(), params.clone());
        self.set_class_params(group_id, &classes)?;
        Ok(Outcome::Changed)
    }

    /// Apply one desired group setting, resolving the group by name.
    pub fn apply_setting(&self, setting: &GroupSetting) -> Result<Outcome> {
        let group_id = self.find_group_id(&setting.group)?;
        self.ensure_class_params(&group_id, &setting.class, &setting.params)
    }
}
