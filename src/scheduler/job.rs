use crate::types::SiteKey;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Regenerate the whole site.
    Build,
    /// Remove the site's output directory.
    Delete,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobKind::Build => "build",
            JobKind::Delete => "delete",
        })
    }
}

/// One request for work on a site. Created per request, never mutated.
///
/// Requests are coalesced by site key alone, whatever their kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildJob {
    kind: JobKind,
    site_key: SiteKey,
}

impl BuildJob {
    pub fn build(site_key: SiteKey) -> Self {
        Self {
            kind: JobKind::Build,
            site_key,
        }
    }

    pub fn delete(site_key: SiteKey) -> Self {
        Self {
            kind: JobKind::Delete,
            site_key,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn site_key(&self) -> &SiteKey {
        &self.site_key
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.site_key)
    }
}

/// What a worker reports back for a job. The master only counts these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed { errors: usize },
}

impl JobOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}
