//! Typed authorization gate.
//!
//! Roles are granted `(resource, action)` pairs in `role_permissions`. The
//! pairs are parsed once per request into [`Capabilities`]; handlers then ask
//! [`can_perform`] instead of matching on strings.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Resource {
    ContractHeader,
    ContractSubset,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Resource::ContractHeader => "ContractHeader",
            Resource::ContractSubset => "ContractSubset",
        }
    }
}

impl FromStr for Resource {
    type Err = UnknownName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ContractHeader" => Ok(Resource::ContractHeader),
            "ContractSubset" => Ok(Resource::ContractSubset),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Index,
    Create,
    Edit,
    Delete,
    Activation,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Activation => "activation",
        }
    }
}

impl FromStr for Action {
    type Err = UnknownName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "index" => Ok(Action::Index),
            "create" => Ok(Action::Create),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            "activation" => Ok(Action::Activation),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown name '{0}'")]
pub struct UnknownName(pub String);

#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    grants: HashSet<(Resource, Action)>,
}

impl Capabilities {
    /// Builds the set from stored `(resource, action)` rows. Rows naming a
    /// resource or action this service does not know are skipped.
    pub fn from_rows<I, S>(rows: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let grants = rows
            .into_iter()
            .filter_map(|(resource, action)| {
                let resource = resource.as_ref().parse::<Resource>().ok()?;
                let action = action.as_ref().parse::<Action>().ok()?;
                Some((resource, action))
            })
            .collect();
        Self { grants }
    }

    #[cfg(test)]
    fn grant(&mut self, resource: Resource, action: Action) {
        self.grants.insert((resource, action));
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.grants.len()
    }

    fn contains(&self, resource: Resource, action: Action) -> bool {
        self.grants.contains(&(resource, action))
    }
}

pub fn can_perform(capabilities: &Capabilities, action: Action, resource: Resource) -> bool {
    capabilities.contains(resource, action)
}

#[cfg(test)]
mod tests {
    use super::{can_perform, Action, Capabilities, Resource};

    #[test]
    fn parses_known_rows_and_skips_unknown_ones() {
        let capabilities = Capabilities::from_rows(vec![
            ("ContractHeader", "index"),
            ("ContractHeader", "activation"),
            ("ContractSubset", "publish"),
            ("MenuHeader", "index"),
        ]);

        assert_eq!(capabilities.len(), 2);
        assert!(can_perform(&capabilities, Action::Index, Resource::ContractHeader));
        assert!(can_perform(
            &capabilities,
            Action::Activation,
            Resource::ContractHeader
        ));
        assert!(!can_perform(&capabilities, Action::Index, Resource::ContractSubset));
    }

    #[test]
    fn grants_are_scoped_to_one_resource() {
        let mut capabilities = Capabilities::default();
        capabilities.grant(Resource::ContractSubset, Action::Delete);

        assert!(can_perform(&capabilities, Action::Delete, Resource::ContractSubset));
        assert!(!can_perform(&capabilities, Action::Delete, Resource::ContractHeader));
        assert!(!can_perform(&capabilities, Action::Edit, Resource::ContractSubset));
    }

    #[test]
    fn names_round_trip_through_their_storage_form() {
        for action in [
            Action::Index,
            Action::Create,
            Action::Edit,
            Action::Delete,
            Action::Activation,
        ] {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert_eq!(
            Resource::ContractSubset.to_string().parse::<Resource>().unwrap(),
            Resource::ContractSubset
        );
        assert!("contractheader".parse::<Resource>().is_err());
    }

    #[test]
    fn unknown_names_surface_as_errors() {
        let err: Box<dyn std::error::Error> = "publish".parse::<Action>().unwrap_err().into();
        assert_eq!(err.to_string(), "unknown name 'publish'");
    }
}
