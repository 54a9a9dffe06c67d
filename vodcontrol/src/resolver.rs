//! Episode list resolution through the metadata service.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use ureq::Agent;
use vodconfig::Config;

use crate::errors::ResolveError;
use crate::model::Episode;

/// Resolves the playable episodes of a title at one source.
pub trait EpisodeResolver: Send + Sync {
    fn resolve_episodes(&self, source: &str, id: &str) -> Result<Vec<Episode>, ResolveError>;
}

/// Raw body of `GET /api/detail`.
#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(default)]
    episodes: Vec<String>,
    #[serde(default)]
    episodes_titles: Vec<String>,
}

impl DetailResponse {
    fn into_episodes(self) -> Vec<Episode> {
        let titles = self.episodes_titles;
        self.episodes
            .into_iter()
            .enumerate()
            .map(|(index, stream_url)| Episode {
                index,
                title: titles
                    .get(index)
                    .filter(|t| !t.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("Episode {}", index + 1)),
                stream_url,
            })
            .collect()
    }
}

/// Blocking HTTP client for the metadata service.
pub struct HttpEpisodeResolver {
    base_url: String,
    agent: Agent,
}

impl HttpEpisodeResolver {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    /// Builds a resolver from the `metadata.*` configuration keys.
    pub fn from_config(config: &Config) -> Result<Self, ResolveError> {
        let base_url = config
            .get_metadata_base_url()
            .ok_or(ResolveError::NotConfigured)?;
        let timeout_secs = config
            .get_metadata_timeout_secs()
            .unwrap_or(vodconfig::DEFAULT_METADATA_TIMEOUT_SECS);
        Ok(Self::new(base_url, Duration::from_secs(timeout_secs)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn detail_url(&self) -> String {
        format!("{}/api/detail", self.base_url)
    }
}

impl EpisodeResolver for HttpEpisodeResolver {
    fn resolve_episodes(&self, source: &str, id: &str) -> Result<Vec<Episode>, ResolveError> {
        let url = self.detail_url();
        debug!(url = %url, source, id, "Fetching episode list");

        let mut response = self
            .agent
            .get(&url)
            .query("source", source)
            .query("id", id)
            .call()?;
        let body = response.body_mut().read_to_string()?;

        let episodes = parse_detail(&body)?;
        if episodes.is_empty() {
            return Err(ResolveError::NoEpisodes {
                source_id: source.to_string(),
                id: id.to_string(),
            });
        }
        debug!(source, id, count = episodes.len(), "Episode list resolved");
        Ok(episodes)
    }
}

fn parse_detail(body: &str) -> Result<Vec<Episode>, ResolveError> {
    let detail: DetailResponse = serde_json::from_str(body)?;
    Ok(detail.into_episodes())
}
