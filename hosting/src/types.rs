use serde::{Deserialize, Serialize};
use std::fmt;

/// A repository on the hosting service, addressed by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub organization: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
        }
    }

    /// `owner/name`, as used in API paths and clone URLs.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.organization, self.name)
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.name)
    }
}

/// Subset of the repository listing returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySummary {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Visibility used when creating a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_and_display() {
        let repo = RepositoryRef::new("templates-python", "m319-lu05-a02-larger");
        assert_eq!(repo.full_name(), "templates-python/m319-lu05-a02-larger");
        assert_eq!(repo.to_string(), repo.full_name());
    }

    #[test]
    fn test_summary_deserializes_with_missing_optional_fields() {
        let summary: RepositorySummary = serde_json::from_str(
            r#"{"name": "m323-lu01-a05-sum", "full_name": "templates-python/m323-lu01-a05-sum"}"#,
        )
        .unwrap();
        assert_eq!(summary.name, "m323-lu01-a05-sum");
        assert!(!summary.private);
        assert!(!summary.is_template);
        assert_eq!(summary.default_branch, None);
    }

    #[test]
    fn test_visibility() {
        assert!(Visibility::Private.is_private());
        assert!(!Visibility::Public.is_private());
    }
}
