//! Declaring and resolving the documentation classpath.
//!
//! Coordinates are built from templates whose version names one of the
//! extracted versions, then resolved to jars through an ordered list of
//! Maven-layout repositories. Transitive (POM) resolution is not attempted.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::version::VersionString;
use crate::{Error, Result, fsutil};

/// A `group:artifact:version` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyCoordinate {
    /// Group id, e.g. `org.codehaus.groovy`.
    pub group: String,
    /// Artifact id, e.g. `groovy-all`.
    pub artifact: String,
    /// Version.
    pub version: String,
}

impl DependencyCoordinate {
    /// Create a coordinate.
    pub fn new(group: impl Into<String>, artifact: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }

    /// Path of the jar within a Maven-layout repository.
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}-{}.jar",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.artifact,
            self.version
        )
    }
}

impl fmt::Display for DependencyCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl FromStr for DependencyCoordinate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [group, artifact, version] if !group.is_empty() && !artifact.is_empty() && !version.is_empty() => {
                Ok(Self::new(*group, *artifact, *version))
            },
            _ => Err(Error::Config(format!(
                "'{s}' is not a group:artifact:version coordinate"
            ))),
        }
    }
}

/// A coordinate whose version is the name of an extracted version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateTemplate {
    /// Group id.
    pub group: String,
    /// Artifact id.
    pub artifact: String,
    /// Name of the extracted version to use.
    pub version: String,
}

impl CoordinateTemplate {
    /// Create a template.
    pub fn new(group: impl Into<String>, artifact: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
            version: version.into(),
        }
    }
}

/// Fill `templates` in with `versions`.
pub fn declare(
    templates: &[CoordinateTemplate],
    versions: &BTreeMap<String, VersionString>,
) -> Result<Vec<DependencyCoordinate>> {
    templates
        .iter()
        .map(|t| {
            versions
                .get(&t.version)
                .map(|v| DependencyCoordinate::new(&t.group, &t.artifact, v.as_str()))
                .ok_or_else(|| Error::Resolution {
                    coordinate: format!("{}:{}:{{{}}}", t.group, t.artifact, t.version),
                    reason: format!("version '{}' was not extracted", t.version),
                })
        })
        .collect()
}

/// One resolved jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClasspathEntry {
    /// What was requested.
    pub coordinate: DependencyCoordinate,
    /// Where the jar lives locally.
    pub path: PathBuf,
}

/// Ordered resolved classpath.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedClasspath {
    /// Entries in request order.
    pub entries: Vec<ClasspathEntry>,
}

impl ResolvedClasspath {
    /// Jar paths in order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|e| e.path.clone()).collect()
    }
}

/// Resolves coordinates to local jars.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve every coordinate, failing on the first that cannot be found.
    async fn resolve(&self, coordinates: &[DependencyCoordinate]) -> Result<ResolvedClasspath>;

    /// Stable description for fingerprints.
    fn describe(&self) -> String {
        String::new()
    }
}

/// A Maven-layout repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repository {
    /// A directory used in place.
    Local(PathBuf),
    /// An `http(s)` base URL whose artifacts are cached locally.
    Remote(Url),
}

impl Repository {
    /// Parse a repository spec: `http(s)://` URLs are remote, anything else a path.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.starts_with("http://") || spec.starts_with("https://") {
            let with_slash = if spec.ends_with('/') {
                spec.to_string()
            } else {
                format!("{spec}/")
            };
            Url::parse(&with_slash)
                .map(Self::Remote)
                .map_err(|e| Error::Config(format!("invalid repository URL '{spec}': {e}")))
        } else {
            Ok(Self::Local(PathBuf::from(spec)))
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// Resolves against repositories in order, caching remote downloads.
#[derive(Debug, Clone)]
pub struct RepositoryResolver {
    repositories: Vec<Repository>,
    cache_dir: PathBuf,
    client: Client,
}

impl RepositoryResolver {
    /// Create a resolver caching downloads under `cache_dir`.
    pub fn new(repositories: Vec<Repository>, cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("docpipe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;
        Ok(Self {
            repositories,
            cache_dir: cache_dir.into(),
            client,
        })
    }

    #[instrument(level = "debug", skip(self), fields(coordinate = %coordinate))]
    async fn resolve_one(&self, coordinate: &DependencyCoordinate) -> Result<PathBuf> {
        let relative = coordinate.repository_path();
        let mut misses = Vec::new();

        for repository in &self.repositories {
            match repository {
                Repository::Local(root) => {
                    let candidate = root.join(&relative);
                    if candidate.is_file() {
                        debug!(path = %candidate.display(), "Found in local repository");
                        return Ok(candidate);
                    }
                    misses.push(format!("{repository}: not found"));
                },
                Repository::Remote(base) => {
                    let cached = self.cache_path(base, &relative);
                    if cached.is_file() {
                        debug!(path = %cached.display(), "Found in download cache");
                        return Ok(cached);
                    }
                    let url = base.join(&relative).map_err(|e| Error::Resolution {
                        coordinate: coordinate.to_string(),
                        reason: format!("bad artifact URL: {e}"),
                    })?;
                    match self.download(&url, &cached).await {
                        Ok(true) => return Ok(cached),
                        Ok(false) => misses.push(format!("{repository}: not found")),
                        Err(e) => misses.push(format!("{repository}: {e}")),
                    }
                },
            }
        }

        Err(Error::Resolution {
            coordinate: coordinate.to_string(),
            reason: if misses.is_empty() {
                "no repositories configured".to_string()
            } else {
                misses.join("; ")
            },
        })
    }

    fn cache_path(&self, base: &Url, relative: &str) -> PathBuf {
        let host = base.host_str().unwrap_or("remote");
        self.cache_dir.join(host).join(relative)
    }

    /// Download `url` to `dest`. `Ok(false)` means the repository does not
    /// have it.
    async fn download(&self, url: &Url, dest: &Path) -> Result<bool> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(Error::Other(format!("HTTP {status}")));
        }
        let bytes = response.bytes().await?;
        fsutil::write_atomic(dest, &bytes)?;
        info!(%url, bytes = bytes.len(), "Downloaded dependency");
        Ok(true)
    }
}

#[async_trait]
impl Resolver for RepositoryResolver {
    async fn resolve(&self, coordinates: &[DependencyCoordinate]) -> Result<ResolvedClasspath> {
        let mut entries = Vec::with_capacity(coordinates.len());
        for coordinate in coordinates {
            let path = self.resolve_one(coordinate).await?;
            entries.push(ClasspathEntry {
                coordinate: coordinate.clone(),
                path,
            });
        }
        Ok(ResolvedClasspath { entries })
    }

    fn describe(&self) -> String {
        self.repositories
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}
