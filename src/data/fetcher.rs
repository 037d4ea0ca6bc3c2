//! Page fetching for the archived puck line pages
//!
//! Supports caching HTML files for offline runs and reduced load.

use crate::{DateToken, PucklineError, Result, SourceConfig};
use scraper::Html;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of parsed puck line pages, one per date token
pub trait PageFetcher {
    /// Fetch and parse the page for a date. Any failure is a transport failure.
    fn fetch(&self, token: &DateToken) -> Result<Html>;

    /// Forget any stored copy of a page that turned out to be unusable
    fn invalidate(&self, _token: &DateToken) {}
}

/// Fetcher for the donbest puck line archive
pub struct DonbestFetcher {
    client: reqwest::blocking::Client,
    base_url: String,
    /// Optional cache directory for offline HTML files
    cache_dir: Option<PathBuf>,
    /// If true, only use cache (no network requests)
    offline_only: bool,
}

impl DonbestFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut fetcher = DonbestFetcher {
            client,
            base_url: config.base_url.clone(),
            cache_dir: None,
            offline_only: config.offline,
        };
        if let Some(dir) = &config.cache_dir {
            fetcher = fetcher.with_cache(dir);
        }
        Ok(fetcher)
    }

    /// Create fetcher with a cache directory
    pub fn with_cache<P: AsRef<Path>>(mut self, cache_dir: P) -> Self {
        self.cache_dir = Some(cache_dir.as_ref().to_path_buf());
        self
    }

    /// Set offline-only mode (no network requests, cache must exist)
    pub fn offline_only(mut self, offline: bool) -> Self {
        self.offline_only = offline;
        self
    }

    pub fn page_url(&self, token: &DateToken) -> String {
        format!("{}{}.html", self.base_url, token)
    }

    fn cache_path(&self, token: &DateToken) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.html", token)))
    }

    fn load_from_cache(&self, token: &DateToken) -> Option<String> {
        let path = self.cache_path(token)?;
        if path.exists() {
            log::debug!("Loading from cache: {}", path.display());
            std::fs::read_to_string(&path).ok()
        } else {
            None
        }
    }

    fn save_to_cache(&self, token: &DateToken, html: &str) -> Result<()> {
        if let Some(path) = self.cache_path(token) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, html)?;
            log::debug!("Saved to cache: {}", path.display());
        }
        Ok(())
    }

    /// Raw page body, from cache when available
    pub fn fetch_body(&self, token: &DateToken) -> Result<String> {
        if let Some(html) = self.load_from_cache(token) {
            return Ok(html);
        }

        if self.offline_only {
            return Err(PucklineError::Transport {
                token: token.clone(),
                message: "no cached page (offline mode)".to_string(),
            });
        }

        let url = self.page_url(token);
        log::debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| PucklineError::Transport {
                token: token.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PucklineError::Transport {
                token: token.clone(),
                message: format!("HTTP {}: {}", response.status(), url),
            });
        }

        let html = response.text().map_err(|e| PucklineError::Transport {
            token: token.clone(),
            message: format!("failed reading body: {}", e),
        })?;

        if let Err(e) = self.save_to_cache(token, &html) {
            log::warn!("Failed to cache {}: {}", url, e);
        }

        Ok(html)
    }
}

impl PageFetcher for DonbestFetcher {
    fn fetch(&self, token: &DateToken) -> Result<Html> {
        let body = self.fetch_body(token)?;
        Ok(Html::parse_document(&body))
    }

    /// Offline runs keep the cache intact; it is the only copy of the page
    fn invalidate(&self, token: &DateToken) {
        if self.offline_only {
            log::debug!("Offline mode: keeping cached page for {}", token);
            return;
        }
        if let Some(path) = self.cache_path(token) {
            if path.exists() {
                match std::fs::remove_file(&path) {
                    Ok(()) => log::debug!("Dropped cached page {}", path.display()),
                    Err(e) => log::warn!("Failed to drop cached page {}: {}", path.display(), e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn offline_fetcher(dir: &Path) -> DonbestFetcher {
        DonbestFetcher::new(&Config::default().source)
            .unwrap()
            .with_cache(dir)
            .offline_only(true)
    }

    #[test]
    fn test_page_url() {
        let fetcher = DonbestFetcher::new(&Config::default().source).unwrap();
        assert_eq!(
            fetcher.page_url(&DateToken::new("20141008")),
            "http://www.donbest.com/nhl/odds/puck-lines/20141008.html"
        );
    }

    #[test]
    fn test_offline_reads_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("20141008.html"),
            "<html><body><div id=\"oddsHolder\"></div></body></html>",
        )
        .unwrap();

        let fetcher = offline_fetcher(dir.path());
        let body = fetcher.fetch_body(&DateToken::new("20141008")).unwrap();
        assert!(body.contains("oddsHolder"));
    }

    #[test]
    fn test_offline_miss_is_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = offline_fetcher(dir.path());

        let err = fetcher.fetch(&DateToken::new("20141009")).unwrap_err();
        assert!(matches!(err, PucklineError::Transport { .. }));
    }

    #[test]
    fn test_invalidate_removes_cached_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20141008.html");
        std::fs::write(&path, "<html></html>").unwrap();

        let fetcher = offline_fetcher(dir.path()).offline_only(false);
        fetcher.invalidate(&DateToken::new("20141008"));
        assert!(!path.exists());

        // Invalidating an uncached page is a no-op
        fetcher.invalidate(&DateToken::new("20141010"));
    }

    #[test]
    fn test_offline_invalidate_keeps_cached_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20141008.html");
        std::fs::write(&path, "<html><body>busy</body></html>").unwrap();

        let fetcher = offline_fetcher(dir.path());
        fetcher.invalidate(&DateToken::new("20141008"));
        assert!(path.exists());
    }
}
