pub mod config;
pub mod github;
pub mod provider;
pub mod types;

pub use config::{load_env_file, GitHubConfig, GitHubToken, API_URL_ENV, TOKEN_ENV};
pub use github::{next_page_url, GitHubProvider};
pub use provider::{HostingError, HostingProvider, HostingResult};
pub use types::{RepositoryRef, RepositorySummary, Visibility};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::github::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
