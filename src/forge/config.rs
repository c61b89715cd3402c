//! Configuration for the hosting service connection.
use secrecy::SecretString;

/// Page size used when listing pull requests.
pub const DEFAULT_PAGE_SIZE: u8 = 100;
/// User agent sent with every API request.
pub const USER_AGENT: &str = "buildbot";

/// Remote repository connection configuration for authenticating and
/// interacting with the hosting service.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Remote forge host (e.g., "github.com").
    pub host: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// REST base for the repository, ending in a slash
    /// (e.g. "https://api.github.com/repos/owner/repo/").
    pub api_url: String,
    /// Access token for authentication.
    pub token: SecretString,
    /// Log writes instead of sending them.
    pub dry_run: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            owner: "".to_string(),
            repo: "".to_string(),
            api_url: "".to_string(),
            token: SecretString::from("".to_string()),
            dry_run: false,
        }
    }
}
