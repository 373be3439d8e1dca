//! Named network targets and schema locations

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Network the service under test is deployed on.
///
/// Each target maps to a fixed (base URL, schema location) pair. The empty
/// string selects [`Target::Local`], which reads the schema from disk.
/// Config files go through the same parser as the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Target {
    Main,
    Dev,
    Qa,
    Test,
    Local,
}

impl Target {
    pub const ALL: [Self; 5] = [Self::Main, Self::Dev, Self::Qa, Self::Test, Self::Local];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Dev => "dev",
            Self::Qa => "qa",
            Self::Test => "test",
            Self::Local => "local",
        }
    }

    /// Base URL of the deployed service.
    #[must_use]
    pub fn base_url(self) -> String {
        match self {
            Self::Main => "https://gridproxy.grid.tf".to_string(),
            Self::Local => "http://localhost:8080".to_string(),
            network => format!("https://gridproxy.{}.grid.tf", network.as_str()),
        }
    }

    /// Where the schema document for this target lives.
    #[must_use]
    pub fn schema_source(self) -> SchemaSource {
        match self {
            Self::Local => SchemaSource::File(PathBuf::from("docs/swagger.json")),
            remote => SchemaSource::Url(format!("{}/swagger/doc.json", remote.base_url())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(Self::Local),
            "main" => Ok(Self::Main),
            "dev" => Ok(Self::Dev),
            "qa" => Ok(Self::Qa),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::UnknownTarget(other.to_string())),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Location of a schema document: remote URL or local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum SchemaSource {
    Url(String),
    File(PathBuf),
}

impl SchemaSource {
    /// `http://` and `https://` locations are URLs, everything else is a path.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::File(PathBuf::from(trimmed))
        }
    }

    /// File extension of the location, lowercased, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            Self::Url(url) => url
                .split(['?', '#'])
                .next()
                .unwrap_or(url)
                .rsplit('/')
                .next()
                .unwrap_or("")
                .to_string(),
            Self::File(path) => path.file_name()?.to_string_lossy().into_owned(),
        };
        name.rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

impl fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_selects_local() {
        assert_eq!("".parse::<Target>().unwrap(), Target::Local);
        assert_eq!(" LOCAL ".parse::<Target>().unwrap(), Target::Local);
    }

    #[test]
    fn unknown_target_rejected() {
        let err = "staging".parse::<Target>().unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn main_target_endpoints() {
        assert_eq!(Target::Main.base_url(), "https://gridproxy.grid.tf");
        assert_eq!(
            Target::Main.schema_source(),
            SchemaSource::Url("https://gridproxy.grid.tf/swagger/doc.json".into())
        );
    }

    #[test]
    fn named_network_target_endpoints() {
        assert_eq!(Target::Qa.base_url(), "https://gridproxy.qa.grid.tf");
        assert_eq!(
            Target::Dev.schema_source(),
            SchemaSource::Url("https://gridproxy.dev.grid.tf/swagger/doc.json".into())
        );
    }

    #[test]
    fn local_target_reads_file() {
        assert_eq!(Target::Local.base_url(), "http://localhost:8080");
        assert_eq!(
            Target::Local.schema_source(),
            SchemaSource::File(PathBuf::from("docs/swagger.json"))
        );
    }

    #[test]
    fn every_target_round_trips_through_its_name() {
        for target in Target::ALL {
            assert_eq!(target.as_str().parse::<Target>().unwrap(), target);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Target::Qa).unwrap(), "\"qa\"");
        let parsed: Target = serde_json::from_str("\"\"").unwrap();
        assert_eq!(parsed, Target::Local);
        assert!(serde_json::from_str::<Target>("\"staging\"").is_err());
    }

    #[test]
    fn schema_source_parse() {
        assert!(matches!(
            SchemaSource::parse("https://api.example.com/openapi.json"),
            SchemaSource::Url(_)
        ));
        assert!(matches!(
            SchemaSource::parse("docs/swagger.yaml"),
            SchemaSource::File(_)
        ));
    }

    #[test]
    fn schema_source_extension() {
        assert_eq!(
            SchemaSource::parse("https://x.io/doc.json?v=2").extension(),
            Some("json".into())
        );
        assert_eq!(
            SchemaSource::parse("specs/API.YML").extension(),
            Some("yml".into())
        );
        assert_eq!(SchemaSource::parse("https://x.io/spec").extension(), None);
    }
}
