use crate::{
    common::error::{
        Error::{DescriptorParse, MissingExposedCommand, QualifiedNameParse},
        Result,
    },
    dogu::version::Version,
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// `<namespace>/<simple-name>`, e.g. `official/ldap`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    namespace: String,
    simple_name: String,
}

impl QualifiedName {
    pub fn new(namespace: impl Into<String>, simple_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            simple_name: simple_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn simple_name(&self) -> &str {
        &self.simple_name
    }
}

impl FromStr for QualifiedName {
    type Err = crate::common::error::Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.split_once('/') {
            Some((namespace, simple_name))
                if !namespace.is_empty() && !simple_name.is_empty() && !simple_name.contains('/') =>
            {
                Ok(Self::new(namespace, simple_name))
            }
            _ => Err(QualifiedNameParse {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.simple_name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyType {
    /// Another dogu in the same cluster.
    #[default]
    Dogu,
    /// A client tool, e.g. the setup client.
    Client,
    /// A package of the underlying system.
    Package,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(rename = "type", default)]
    pub type_: DependencyType,
    pub name: String,
    /// Version constraint, e.g. `>=2.4.48-4`. Empty means any version.
    #[serde(default)]
    pub version: String,
}

/// A named script entry point inside a dogu image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExposedCommand {
    pub name: String,
    pub command: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceAccount {
    #[serde(rename = "Type")]
    pub type_: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub kind: String,
}

/// The versioned metadata document of a dogu (dogu.json).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DoguDescriptor {
    pub name: String,
    pub version: String,
    pub image: String,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub optional_dependencies: Vec<Dependency>,
    #[serde(default)]
    pub exposed_commands: Vec<ExposedCommand>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccount>,
}

impl DoguDescriptor {
    pub fn from_json(input: &[u8]) -> Result<Self> {
        serde_json::from_slice(input).map_err(|e| DescriptorParse { source: e })
    }

    pub fn qualified_name(&self) -> Result<QualifiedName> {
        self.name.parse()
    }

    /// The simple name, e.g. `ldap` for `official/ldap`. A name without namespace is returned
    /// as is.
    pub fn simple_name(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(_, simple)| simple)
            .unwrap_or(&self.name)
    }

    /// The namespace, e.g. `official` for `official/ldap`, empty if the name carries none.
    pub fn namespace(&self) -> &str {
        self.name
            .rsplit_once('/')
            .map(|(namespace, _)| namespace)
            .unwrap_or_default()
    }

    pub fn parsed_version(&self) -> Result<Version> {
        Version::parse(&self.version)
    }

    /// `<image>:<version>`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }

    pub fn has_exposed_command(&self, name: &str) -> bool {
        self.exposed_commands.iter().any(|c| c.name == name)
    }

    pub fn exposed_command(&self, name: &str) -> Result<&ExposedCommand> {
        self.exposed_commands
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MissingExposedCommand {
                dogu: self.name.clone(),
                command: name.to_string(),
            })
    }

    /// Mandatory dependencies on other dogus. Client and package dependencies are left out.
    pub fn mandatory_dogu_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.type_ == DependencyType::Dogu)
    }
}
