//! Project and deployment target domain types
//!
//! Owned by the API service; the dispatchers only read them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::ParseEnumError;

/// A project that can be built and deployed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// URL-safe name, used as the platform application name
    pub slug: String,
    pub language: Language,
    pub framework: Option<String>,
    /// Default manifest (YAML) used when a deployment carries none
    pub manifest: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// Declared project language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    Java,
    Nodejs,
    Python,
    Go,
    Ruby,
    Dotnet,
    Staticfile,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Java => "JAVA",
            Language::Nodejs => "NODEJS",
            Language::Python => "PYTHON",
            Language::Go => "GO",
            Language::Ruby => "RUBY",
            Language::Dotnet => "DOTNET",
            Language::Staticfile => "STATICFILE",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "JAVA" => Ok(Language::Java),
            "NODEJS" => Ok(Language::Nodejs),
            "PYTHON" => Ok(Language::Python),
            "GO" => Ok(Language::Go),
            "RUBY" => Ok(Language::Ruby),
            "DOTNET" => Ok(Language::Dotnet),
            "STATICFILE" => Ok(Language::Staticfile),
            _ => Err(ParseEnumError::new("language", s)),
        }
    }
}

/// A platform foundation a project can be deployed to
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployTarget {
    pub id: Uuid,
    /// e.g. `https://api.sys.example.com`
    pub api_endpoint: String,
    pub org_name: String,
    pub space_name: String,
    pub is_default: bool,
}

impl DeployTarget {
    /// Routing domain for applications on this foundation
    ///
    /// `https://api.sys.example.com` becomes `apps.sys.example.com`.
    pub fn apps_domain(&self) -> String {
        let host = self
            .api_endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');

        match host.strip_prefix("api.") {
            Some(rest) => format!("apps.{}", rest),
            None => host.to_string(),
        }
    }
}
