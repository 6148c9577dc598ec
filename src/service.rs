//! Read-through cached access to template lists and gitignore content.

use std::sync::Arc;
use tracing::{debug, info};

use crate::api;
use crate::cache::{CacheLayer, StateStore};
use crate::clock::Clock;
use crate::config::Config;
use crate::dedup::Deduplicator;
use crate::error::Result;
use crate::transport::Transport;

/// Cache key for a template selection: names sorted and comma-joined, so
/// the same selection in any order shares one entry.
pub fn canonical_key(templates: &[String]) -> String {
  let mut sorted = templates.to_vec();
  sorted.sort();
  sorted.join(",")
}

/// Template service with transparent caching and request deduplication.
///
/// Owns the process-wide state: the persistent cache and the in-flight
/// request maps. Configuration is passed per call and treated as a snapshot.
pub struct TemplateService<S: StateStore> {
  cache: CacheLayer<S>,
  transport: Transport,
  template_requests: Deduplicator<Vec<String>>,
  content_requests: Deduplicator<String>,
}

impl<S: StateStore + 'static> TemplateService<S> {
  pub fn new(storage: S, transport: Transport) -> Self {
    Self {
      cache: CacheLayer::new(storage),
      transport,
      template_requests: Deduplicator::new(),
      content_requests: Deduplicator::new(),
    }
  }

  /// Replace the time source used for cache timestamps.
  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.cache = self.cache.with_clock(clock);
    self
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  /// Template names, from cache when fresh, otherwise from the API.
  pub async fn get_templates(&self, config: &Config) -> Result<Vec<String>> {
    if let Some(templates) = self.cache.fresh_templates(config.template_list_ttl)? {
      debug!(count = templates.len(), "template list cache hit");
      return Ok(templates);
    }

    let request_key = format!("templates:{}", config.endpoint_label());
    let cache = self.cache.clone();
    let transport = self.transport.clone();
    let endpoint = config.custom_api_endpoint.clone();

    self
      .template_requests
      .run(&request_key, move || async move {
        let fetched = api::fetch_templates(&transport, endpoint.as_ref()).await?;
        cache.store_templates(&fetched)?;
        info!(count = fetched.len(), "refreshed template list");
        Ok(fetched)
      })
      .await
  }

  /// Combined gitignore content for `templates`, from cache when fresh,
  /// otherwise from the API.
  ///
  /// The request URL keeps the caller's order; the cache key does not.
  pub async fn get_gitignore_content(&self, config: &Config, templates: &[String]) -> Result<String> {
    let cache_key = canonical_key(templates);
    let content_cache = self.cache.content_cache()?;

    if let Some(content) =
      self
        .cache
        .fresh_content(&content_cache, &cache_key, config.gitignore_cache_ttl)
    {
      debug!(key = %cache_key, "gitignore cache hit");
      return Ok(content);
    }

    let request_key = format!("gitignore:{}:{}", cache_key, config.endpoint_label());
    let cache = self.cache.clone();
    let transport = self.transport.clone();
    let endpoint = config.custom_api_endpoint.clone();
    let max_cache_size = config.max_cache_size;
    let templates = templates.to_vec();

    self
      .content_requests
      .run(&request_key, move || async move {
        let fetched =
          api::fetch_gitignore_content(&transport, endpoint.as_ref(), &templates).await?;
        // Merge into the current map, not the one read before the fetch.
        let current = cache.content_cache()?;
        cache.store_content(current, &cache_key, &fetched, max_cache_size)?;
        Ok(fetched)
      })
      .await
  }

  /// Drop every cached list and content entry.
  pub fn clear_all_cache(&self) -> Result<()> {
    self.cache.clear_all()?;
    info!("cleared template cache");
    Ok(())
  }
}
