// ABOUTME: Clone and upload URL construction with an embedded indexer credential
// ABOUTME: The base URL's userinfo is replaced by `indexer:<token>`

use crate::error::{HandlerError, Result};
use url::Url;

const CREDENTIAL_USER: &str = "indexer";
const GIT_ROUTE: &str = ".internal-code-intel/git";

/// URL the workspace fetches the repository from
pub fn make_clone_url(base_url: &str, auth_token: &str, repository_name: &str) -> Result<Url> {
    let base = with_credentials(base_url, auth_token)?;
    let path = format!("{}/{}", GIT_ROUTE, repository_name.trim_start_matches('/'));
    base.join(&path).map_err(|e| HandlerError::Url {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

/// Endpoint handed to the uploader inside the sandbox
pub fn make_upload_url(base_url: &str, auth_token: &str) -> Result<Url> {
    with_credentials(base_url, auth_token)
}

fn with_credentials(base_url: &str, auth_token: &str) -> Result<Url> {
    let invalid = |reason: String| HandlerError::Url {
        url: base_url.to_string(),
        reason,
    };

    let mut url = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    url.set_username(CREDENTIAL_USER)
        .map_err(|_| invalid("cannot carry credentials".to_string()))?;
    url.set_password(Some(auth_token))
        .map_err(|_| invalid("cannot carry credentials".to_string()))?;
    Ok(url)
}
