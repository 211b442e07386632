// Previous-lesson navigation: classify the live referrer, remember the last
// accepted one through the store, and surface a back button when a target
// exists. Arrivals from search and social feeds are not lessons.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::page::PageSurface;
use crate::store::{LayeredStore, Namespace};

pub const NAVIGATION_NAMESPACE: &str = "navigation";

const PREVIOUS_LESSON_KEY: &str = "previous_lesson";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousLesson {
    pub url: String,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ReferrerPolicy {
    pub internal_only: bool,
    pub allowed_domains: Vec<String>,
    pub excluded_domains: Vec<String>,
}

impl ReferrerPolicy {
    pub fn from_config(config: &Config) -> Self {
        ReferrerPolicy {
            internal_only: config.referrer_internal_only,
            allowed_domains: config.referrer_allowed_domains.clone(),
            excluded_domains: config.referrer_excluded_domains.clone(),
        }
    }

    /// Decide whether a referrer counts as a lesson the visitor came from.
    pub fn accepts(&self, referrer: &str, current_url: &str) -> bool {
        let Some(host) = host_of(referrer) else {
            tracing::debug!(referrer, "unparseable referrer rejected");
            return false;
        };
        if self
            .excluded_domains
            .iter()
            .any(|domain| host.contains(domain.as_str()))
        {
            tracing::debug!(referrer, "referrer excluded (search engine or social)");
            return false;
        }
        if self.internal_only {
            return host_of(current_url) == Some(host);
        }
        if !self.allowed_domains.is_empty() {
            return self
                .allowed_domains
                .iter()
                .any(|domain| host.contains(domain.as_str()));
        }
        true
    }
}

/// Store-backed memory of where the visitor came from.
pub struct NavigationMemory {
    ns: Namespace,
    policy: ReferrerPolicy,
}

impl NavigationMemory {
    pub fn new(store: &Arc<LayeredStore>, policy: ReferrerPolicy) -> Self {
        NavigationMemory {
            ns: store.namespace(NAVIGATION_NAMESPACE),
            policy,
        }
    }

    /// Work out the back-button target for this visit. An accepted live
    /// referrer is remembered and used; otherwise the persisted record from
    /// an earlier visit fills in (direct entry, bookmark, search arrival).
    pub fn resolve(&self, current_url: &str, referrer: Option<&str>) -> Option<String> {
        if let Some(referrer) = referrer.filter(|r| !r.is_empty()) {
            if self.policy.accepts(referrer, current_url) {
                let record = PreviousLesson {
                    url: referrer.to_string(),
                    captured_at: Utc::now(),
                };
                if let Ok(value) = serde_json::to_value(&record) {
                    self.ns.set(PREVIOUS_LESSON_KEY, value);
                }
                return Some(referrer.to_string());
            }
        } else {
            tracing::debug!("no referrer; visitor typed the URL or used a bookmark");
        }
        self.previous_lesson().map(|record| record.url)
    }

    pub fn previous_lesson(&self) -> Option<PreviousLesson> {
        let value = self.ns.get(PREVIOUS_LESSON_KEY)?;
        serde_json::from_value(value).ok()
    }

    /// Resolve and render in one step; no target means no button.
    pub fn install_back_button(
        &self,
        current_url: &str,
        referrer: Option<&str>,
        page: &mut dyn PageSurface,
    ) {
        match self.resolve(current_url, referrer) {
            Some(url) => {
                tracing::debug!(%url, "showing back button");
                page.show_back_button(&url);
            }
            None => tracing::debug!("no previous lesson known; back button hidden"),
        }
    }
}

/// Hostname from a URL-ish string, without dragging in a URL parser for the
/// one field we need. Handles scheme, userinfo, port, path, query.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map_or(url, |(_, r)| r);
    let rest = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let rest = rest.rsplit_once('@').map_or(rest, |(_, h)| h);
    let host = rest.split(':').next().unwrap_or(rest);
    if host.is_empty() { None } else { Some(host) }
}

#[cfg(test)]
mod tests {
    use crate::page::VirtualPage;
    use crate::store::{LayerKind, LayeredStore, MemoryBackend, StorageBackend};

    use super::*;

    const LESSON_2: &str = "https://pages.example.com/lesson-2?userId=42";
    const LESSON_3: &str = "https://pages.example.com/lesson-3?userId=42";

    fn store() -> Arc<LayeredStore> {
        Arc::new(LayeredStore::new(vec![
            Arc::new(MemoryBackend::new(LayerKind::Session)) as Arc<dyn StorageBackend>,
        ]))
    }

    fn default_policy() -> ReferrerPolicy {
        ReferrerPolicy::from_config(&Config::default())
    }

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("https://a.example.com/x?y=1"), Some("a.example.com"));
        assert_eq!(host_of("http://user@b.example.com:8080/"), Some("b.example.com"));
        assert_eq!(host_of("pages.example.com"), Some("pages.example.com"));
        assert_eq!(host_of(""), None);
    }

    #[test]
    fn search_and_social_referrers_are_rejected_and_not_persisted() {
        let store = store();
        let memory = NavigationMemory::new(&store, default_policy());
        let target = memory.resolve(LESSON_3, Some("https://www.google.com/search?q=x"));
        assert_eq!(target, None);
        assert!(memory.previous_lesson().is_none());
    }

    #[test]
    fn accepted_referrer_is_persisted_and_reused() {
        let store = store();
        let memory = NavigationMemory::new(&store, default_policy());
        assert_eq!(
            memory.resolve(LESSON_3, Some(LESSON_2)),
            Some(LESSON_2.to_string())
        );

        // Next visit arrives with no referrer; the record fills in.
        assert_eq!(memory.resolve(LESSON_3, None), Some(LESSON_2.to_string()));
    }

    #[test]
    fn internal_only_rejects_other_hosts() {
        let store = store();
        let policy = ReferrerPolicy {
            internal_only: true,
            ..default_policy()
        };
        let memory = NavigationMemory::new(&store, policy);
        assert_eq!(
            memory.resolve(LESSON_3, Some("https://other.example.net/lesson-1")),
            None
        );
        assert_eq!(
            memory.resolve(LESSON_3, Some(LESSON_2)),
            Some(LESSON_2.to_string())
        );
    }

    #[test]
    fn allow_list_limits_accepted_hosts() {
        let store = store();
        let policy = ReferrerPolicy {
            allowed_domains: vec!["partner.example.org".into()],
            ..default_policy()
        };
        let memory = NavigationMemory::new(&store, policy);
        assert_eq!(memory.resolve(LESSON_3, Some(LESSON_2)), None);
        assert_eq!(
            memory.resolve(LESSON_3, Some("https://partner.example.org/intro")),
            Some("https://partner.example.org/intro".to_string())
        );
    }

    #[test]
    fn back_button_renders_only_with_a_target() {
        let store = store();
        let memory = NavigationMemory::new(&store, default_policy());
        let page = VirtualPage::new();
        let mut surface = page.clone();

        memory.install_back_button(LESSON_3, None, &mut surface);
        assert_eq!(page.back_button_url(), None);

        memory.install_back_button(LESSON_3, Some(LESSON_2), &mut surface);
        assert_eq!(page.back_button_url(), Some(LESSON_2.to_string()));
    }
}
