use crate::types::{RepositoryRef, RepositorySummary, Visibility};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostingError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Repository not found: {repository}")]
    NotFound { repository: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing credential: environment variable {variable} is not set")]
    MissingCredential { variable: String },

    #[error("Hosting API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed")]
    Authentication,
}

pub type HostingResult<T> = Result<T, HostingError>;

/// Administrative operations on the hosting service.
///
/// Every call is a single authenticated request; nothing is retried.
#[async_trait]
pub trait HostingProvider: Send + Sync {
    async fn transfer(&self, repo: &RepositoryRef, new_owner: &str) -> HostingResult<()>;

    async fn delete(&self, repo: &RepositoryRef) -> HostingResult<()>;

    async fn set_template(&self, repo: &RepositoryRef) -> HostingResult<()>;

    async fn create(&self, repo: &RepositoryRef, visibility: Visibility) -> HostingResult<()>;

    /// Lists repositories of `organization`, keeping only names containing
    /// `keyword` when one is given.
    async fn list_repositories(
        &self,
        organization: &str,
        keyword: Option<&str>,
    ) -> HostingResult<Vec<RepositorySummary>>;

    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockProvider {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostingProvider for MockProvider {
        async fn transfer(&self, repo: &RepositoryRef, new_owner: &str) -> HostingResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("transfer {} -> {}", repo, new_owner));
            Ok(())
        }

        async fn delete(&self, repo: &RepositoryRef) -> HostingResult<()> {
            if repo.name == "missing" {
                return Err(HostingError::NotFound {
                    repository: repo.full_name(),
                });
            }
            self.calls.lock().unwrap().push(format!("delete {}", repo));
            Ok(())
        }

        async fn set_template(&self, repo: &RepositoryRef) -> HostingResult<()> {
            self.calls.lock().unwrap().push(format!("template {}", repo));
            Ok(())
        }

        async fn create(&self, repo: &RepositoryRef, visibility: Visibility) -> HostingResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create {} {:?}", repo, visibility));
            Ok(())
        }

        async fn list_repositories(
            &self,
            organization: &str,
            keyword: Option<&str>,
        ) -> HostingResult<Vec<RepositorySummary>> {
            let names = ["m319-lu05-a02-larger", "m323-lu01-a05-sum"];
            Ok(names
                .iter()
                .filter(|name| keyword.map_or(true, |k| name.contains(k)))
                .map(|name| RepositorySummary {
                    name: name.to_string(),
                    full_name: format!("{}/{}", organization, name),
                    private: false,
                    is_template: false,
                    default_branch: Some("main".to_string()),
                })
                .collect())
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_provider() {
        let provider = MockProvider::default();
        let repo = RepositoryRef::new("BZZ-M319", "m319-lb01-primes");

        provider.transfer(&repo, "templates-python").await.unwrap();
        provider.set_template(&repo).await.unwrap();
        provider.delete(&repo).await.unwrap();
        provider.create(&repo, Visibility::Public).await.unwrap();

        let missing = RepositoryRef::new("BZZ-M319", "missing");
        assert!(matches!(
            provider.delete(&missing).await,
            Err(HostingError::NotFound { .. })
        ));

        let listed = provider
            .list_repositories("templates-python", Some("323"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "m323-lu01-a05-sum");

        assert_eq!(provider.calls.lock().unwrap().len(), 4);
        assert_eq!(provider.provider_name(), "mock");
    }

    #[test]
    fn test_error_messages() {
        let err = HostingError::MissingCredential {
            variable: "GITHUB_TOKEN".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing credential: environment variable GITHUB_TOKEN is not set"
        );

        let err = HostingError::Api {
            status: 422,
            message: "name already exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Hosting API returned 422: name already exists"
        );
    }
}
