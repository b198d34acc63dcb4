use serde::{Deserialize, Serialize};
use std::fmt;

/// Username presented with token credentials. Git hosts only look at the
/// password for token auth, so any non-empty value works.
pub const BASIC_AUTH_USERNAME: &str = "This can be any string.";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    None,
    Token,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Token => "token",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication settings of one side of a pair. An unset `method` means the
/// configured default applies.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Authentication {
    #[serde(default, deserialize_with = "empty_method_as_unset")]
    pub method: Option<AuthMethod>,
    #[serde(default)]
    pub token_name: String,
}

impl Authentication {
    pub fn token(token_name: impl Into<String>) -> Self {
        Self {
            method: Some(AuthMethod::Token),
            token_name: token_name.into(),
        }
    }

    /// Resolves the credential presented to the git host. A token method whose
    /// variable is unset or empty degrades to anonymous access.
    pub fn resolve<F>(&self, lookup: F) -> Option<RepoAuth>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.method != Some(AuthMethod::Token) || self.token_name.is_empty() {
            return None;
        }
        let token = lookup(&self.token_name).filter(|value| !value.is_empty())?;
        Some(RepoAuth {
            username: BASIC_AUTH_USERNAME.to_string(),
            token,
        })
    }
}

fn empty_method_as_unset<'de, D>(deserializer: D) -> Result<Option<AuthMethod>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some("none") => Ok(Some(AuthMethod::None)),
        Some("token") => Ok(Some(AuthMethod::Token)),
        Some(other) => Err(serde::de::Error::unknown_variant(other, &["none", "token"])),
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "repo", default)]
    pub url: String,
    #[serde(default)]
    pub auth: Authentication,
}

impl Repository {
    pub fn new(url: impl Into<String>, auth: Authentication) -> Self {
        Self {
            url: url.into(),
            auth,
        }
    }

    /// Last path segment of the URL, used to spot pairs that look mismatched.
    pub fn project_name(&self) -> &str {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct RepositoryPair {
    #[serde(default)]
    pub source: Repository,
    #[serde(default)]
    pub destination: Repository,
}

/// HTTP basic credentials handed to the git client. Never serialized.
#[derive(Clone, Eq, PartialEq)]
pub struct RepoAuth {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for RepoAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoAuth")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}
