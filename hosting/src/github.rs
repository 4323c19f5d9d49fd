use crate::config::{GitHubConfig, GitHubToken};
use crate::provider::{HostingError, HostingProvider, HostingResult};
use crate::types::{RepositoryRef, RepositorySummary, Visibility};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{debug, info};

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const PAGE_SIZE: u32 = 100;

#[derive(Serialize)]
struct TransferRequest<'a> {
    new_owner: &'a str,
}

#[derive(Serialize)]
struct EditRequest {
    is_template: bool,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    name: &'a str,
    private: bool,
}

pub struct GitHubProvider {
    http_client: reqwest::Client,
    api_url: String,
    token: GitHubToken,
}

impl GitHubProvider {
    pub fn new(config: GitHubConfig, token: GitHubToken) -> HostingResult<Self> {
        config
            .validate()
            .map_err(|message| HostingError::InvalidConfig { message })?;

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HostingError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .bearer_auth(self.token.expose())
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    fn repo_url(&self, repo: &RepositoryRef) -> String {
        format!("{}/repos/{}", self.api_url, repo.full_name())
    }

    /// Maps non-success statuses onto [`HostingError`].
    async fn check_status(response: Response, subject: &str) -> HostingResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(HostingError::Authentication),
            StatusCode::NOT_FOUND => Err(HostingError::NotFound {
                repository: subject.to_string(),
            }),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(HostingError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Extracts the `rel="next"` target from a `Link` response header.
pub fn next_page_url(headers: &HeaderMap) -> Option<String> {
    static NEXT: OnceLock<Regex> = OnceLock::new();
    let pattern =
        NEXT.get_or_init(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).expect("valid regex"));

    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',')
        .find_map(|part| pattern.captures(part.trim()))
        .map(|captures| captures[1].to_string())
}

#[async_trait]
impl HostingProvider for GitHubProvider {
    async fn transfer(&self, repo: &RepositoryRef, new_owner: &str) -> HostingResult<()> {
        debug!(repo = %repo, new_owner, "requesting transfer");
        let url = format!("{}/transfer", self.repo_url(repo));
        let response = self
            .request(Method::POST, &url)
            .json(&TransferRequest { new_owner })
            .send()
            .await?;
        Self::check_status(response, &repo.full_name()).await?;
        info!(repo = %repo, new_owner, "transfer accepted");
        Ok(())
    }

    async fn delete(&self, repo: &RepositoryRef) -> HostingResult<()> {
        debug!(repo = %repo, "deleting repository");
        let response = self
            .request(Method::DELETE, &self.repo_url(repo))
            .send()
            .await?;
        Self::check_status(response, &repo.full_name()).await?;
        info!(repo = %repo, "repository deleted");
        Ok(())
    }

    async fn set_template(&self, repo: &RepositoryRef) -> HostingResult<()> {
        debug!(repo = %repo, "marking repository as template");
        let response = self
            .request(Method::PATCH, &self.repo_url(repo))
            .json(&EditRequest { is_template: true })
            .send()
            .await?;
        Self::check_status(response, &repo.full_name()).await?;
        info!(repo = %repo, "repository is now a template");
        Ok(())
    }

    async fn create(&self, repo: &RepositoryRef, visibility: Visibility) -> HostingResult<()> {
        debug!(repo = %repo, ?visibility, "creating repository");
        let url = format!("{}/orgs/{}/repos", self.api_url, repo.organization);
        let response = self
            .request(Method::POST, &url)
            .json(&CreateRequest {
                name: &repo.name,
                private: visibility.is_private(),
            })
            .send()
            .await?;
        Self::check_status(response, &repo.organization).await?;
        info!(repo = %repo, "repository created");
        Ok(())
    }

    async fn list_repositories(
        &self,
        organization: &str,
        keyword: Option<&str>,
    ) -> HostingResult<Vec<RepositorySummary>> {
        let mut repositories = Vec::new();
        let first_page = format!("{}/orgs/{}/repos", self.api_url, organization);
        let mut next = Some(first_page.clone());

        while let Some(url) = next.take() {
            let mut request = self.request(Method::GET, &url);
            if url == first_page {
                request = request.query(&[("per_page", PAGE_SIZE)]);
            }

            let response = Self::check_status(request.send().await?, organization).await?;
            next = next_page_url(response.headers());

            let body = response.text().await?;
            let page: Vec<RepositorySummary> = serde_json::from_str(&body)?;
            debug!(organization, count = page.len(), "fetched repository page");

            repositories.extend(
                page.into_iter()
                    .filter(|repo| keyword.map_or(true, |k| repo.name.contains(k))),
            );
        }

        info!(
            organization,
            count = repositories.len(),
            "listed repositories"
        );
        Ok(repositories)
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}
