//! Start/target topic selection, decoupled from the session lifecycle.
//!
//! A [`TopicPairSelector`] yields the pair committed when a race starts. The
//! random selector draws from a [`TopicCatalog`]; two catalogs ship with the
//! crate: a static list from configuration and, behind the `wikimedia-catalog`
//! feature, the most viewed English Wikipedia articles of the previous month.

use std::sync::Arc;

use futures::future::BoxFuture;
use rand::seq::IndexedRandom;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::{CatalogKind, TopicMode, TopicsConfig},
    state::session::TopicPair,
};

/// Failures while choosing a topic pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The catalog has nothing to draw from.
    #[error("topic catalog is empty")]
    EmptyCatalog,
    /// No distinct, existing target was found within the draw budget.
    #[error("no distinct target topic found after {0} draws")]
    Exhausted(u32),
    /// Start and target are the same topic.
    #[error("start and target topics must differ (both `{0}`)")]
    SameTopic(String),
    /// Fixed mode was selected without both topics configured.
    #[error("fixed topic mode requires both a start and a target topic")]
    MissingFixedTopics,
    /// The remote catalog could not be queried.
    #[error("topic catalog request failed: {0}")]
    Catalog(String),
}

/// Capability used by the lifecycle manager when a race starts.
pub trait TopicPairSelector: Send + Sync {
    /// Produce a start/target pair with distinct topics.
    fn choose(&self) -> BoxFuture<'static, Result<TopicPair, TopicError>>;
}

/// Source of popular topics.
pub trait TopicCatalog: Send + Sync {
    /// Draw one popular topic at random.
    fn random_popular_topic(&self) -> BoxFuture<'static, Result<String, TopicError>>;
    /// Whether `topic` names an existing article.
    fn topic_exists(&self, topic: String) -> BoxFuture<'static, Result<bool, TopicError>>;
}

/// Selector that always returns the same pair.
#[derive(Debug, Clone)]
pub struct FixedTopicPair {
    pair: TopicPair,
}

impl FixedTopicPair {
    /// Build a fixed selector, rejecting a pair whose topics are equal.
    pub fn new(start: impl Into<String>, target: impl Into<String>) -> Result<Self, TopicError> {
        let start = start.into().trim().to_owned();
        let target = target.into().trim().to_owned();
        if start.is_empty() || target.is_empty() {
            return Err(TopicError::MissingFixedTopics);
        }
        if start == target {
            return Err(TopicError::SameTopic(start));
        }
        Ok(Self {
            pair: TopicPair { start, target },
        })
    }
}

impl TopicPairSelector for FixedTopicPair {
    fn choose(&self) -> BoxFuture<'static, Result<TopicPair, TopicError>> {
        let pair = self.pair.clone();
        Box::pin(async move { Ok(pair) })
    }
}

/// Selector drawing two distinct topics from a catalog.
///
/// The start topic is drawn once; the target is redrawn until it differs from
/// the start and exists, at most `max_draws` times.
#[derive(Clone)]
pub struct RandomTopicPair {
    catalog: Arc<dyn TopicCatalog>,
    max_draws: u32,
}

impl RandomTopicPair {
    /// Wrap a catalog with a bounded draw budget.
    pub fn new(catalog: Arc<dyn TopicCatalog>, max_draws: u32) -> Self {
        Self {
            catalog,
            max_draws: max_draws.max(1),
        }
    }
}

impl TopicPairSelector for RandomTopicPair {
    fn choose(&self) -> BoxFuture<'static, Result<TopicPair, TopicError>> {
        let catalog = self.catalog.clone();
        let max_draws = self.max_draws;
        Box::pin(async move {
            let start = catalog.random_popular_topic().await?;
            for draw in 1..=max_draws {
                let target = catalog.random_popular_topic().await?;
                if target == start {
                    debug!(draw, topic = %target, "target equals start; redrawing");
                    continue;
                }
                if !catalog.topic_exists(target.clone()).await? {
                    debug!(draw, topic = %target, "target does not exist; redrawing");
                    continue;
                }
                return Ok(TopicPair { start, target });
            }
            Err(TopicError::Exhausted(max_draws))
        })
    }
}

/// Catalog backed by a fixed list of topics.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    topics: Arc<[String]>,
}

impl StaticCatalog {
    /// Build a catalog over `topics`.
    pub fn new(topics: impl IntoIterator<Item = String>) -> Self {
        Self {
            topics: topics.into_iter().collect(),
        }
    }
}

impl TopicCatalog for StaticCatalog {
    fn random_popular_topic(&self) -> BoxFuture<'static, Result<String, TopicError>> {
        let pick = self
            .topics
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(TopicError::EmptyCatalog);
        Box::pin(async move { pick })
    }

    fn topic_exists(&self, topic: String) -> BoxFuture<'static, Result<bool, TopicError>> {
        let exists = self.topics.contains(&topic);
        Box::pin(async move { Ok(exists) })
    }
}

/// Build the selector described by the configuration.
pub fn selector_from_config(
    config: &TopicsConfig,
) -> Result<Arc<dyn TopicPairSelector>, TopicError> {
    match config.mode {
        TopicMode::Fixed => {
            let (Some(start), Some(target)) = (&config.fixed_start, &config.fixed_target) else {
                return Err(TopicError::MissingFixedTopics);
            };
            Ok(Arc::new(FixedTopicPair::new(start.as_str(), target.as_str())?))
        }
        TopicMode::Random => {
            let catalog = catalog_from_config(config);
            Ok(Arc::new(RandomTopicPair::new(catalog, config.max_draws)))
        }
    }
}

fn catalog_from_config(config: &TopicsConfig) -> Arc<dyn TopicCatalog> {
    match config.catalog {
        CatalogKind::Static => Arc::new(StaticCatalog::new(config.static_topics.clone())),
        #[cfg(feature = "wikimedia-catalog")]
        CatalogKind::Wikimedia => match wikimedia::WikimediaCatalog::new() {
            Ok(catalog) => Arc::new(catalog),
            Err(err) => {
                warn!(error = %err, "failed to build wikimedia catalog; using static topics");
                Arc::new(StaticCatalog::new(config.static_topics.clone()))
            }
        },
        #[cfg(not(feature = "wikimedia-catalog"))]
        CatalogKind::Wikimedia => {
            warn!("wikimedia catalog not compiled in; using static topics");
            Arc::new(StaticCatalog::new(config.static_topics.clone()))
        }
    }
}

/// Catalog of the most viewed English Wikipedia articles.
#[cfg(feature = "wikimedia-catalog")]
pub mod wikimedia {
    use std::{future::Future, sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use rand::seq::IndexedRandom;
    use serde::Deserialize;
    use time::{Month, OffsetDateTime};
    use tokio::sync::Mutex;
    use tracing::info;

    use super::{TopicCatalog, TopicError};

    const TOP_VIEWS_BASE: &str =
        "https://wikimedia.org/api/rest_v1/metrics/pageviews/top/en.wikipedia/all-access";
    const QUERY_API: &str = "https://en.wikipedia.org/w/api.php";
    const USER_AGENT: &str = concat!("wiki-race-back/", env!("CARGO_PKG_VERSION"));
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Only the head of the ranking is used so topics stay well known.
    const POPULAR_LIMIT: usize = 500;
    const MAIN_PAGE: &str = "Main_Page";

    #[derive(Debug, Deserialize)]
    pub(super) struct TopViewsResponse {
        items: Vec<TopViewsItem>,
    }

    #[derive(Debug, Deserialize)]
    struct TopViewsItem {
        articles: Vec<TopArticle>,
    }

    #[derive(Debug, Deserialize)]
    struct TopArticle {
        article: String,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct QueryResponse {
        query: QueryPages,
    }

    #[derive(Debug, Deserialize)]
    struct QueryPages {
        #[serde(default)]
        pages: Vec<QueryPage>,
    }

    #[derive(Debug, Deserialize)]
    struct QueryPage {
        #[serde(default)]
        missing: bool,
        #[serde(default)]
        invalid: bool,
    }

    /// Year and month of a ranking.
    pub(super) type RankingMonth = (i32, u8);

    /// Popular titles of the last fetched ranking month.
    #[derive(Default)]
    pub(super) struct MonthlyCache {
        slot: Mutex<Option<(RankingMonth, Arc<Vec<String>>)>>,
    }

    impl MonthlyCache {
        /// Cached titles when they belong to `month`, otherwise the result of
        /// `fetch`, which replaces the cache on success.
        pub(super) async fn get_or_fetch<F, Fut>(
            &self,
            month: RankingMonth,
            fetch: F,
        ) -> Result<Arc<Vec<String>>, TopicError>
        where
            F: FnOnce(RankingMonth) -> Fut,
            Fut: Future<Output = Result<Vec<String>, TopicError>>,
        {
            let mut slot = self.slot.lock().await;
            if let Some((_, titles)) = slot.as_ref().filter(|(cached, _)| *cached == month) {
                return Ok(titles.clone());
            }
            let titles = Arc::new(fetch(month).await?);
            *slot = Some((month, titles.clone()));
            Ok(titles)
        }
    }

    /// Catalog drawing from the previous month's top page views, fetched once
    /// per month and cached.
    #[derive(Clone)]
    pub struct WikimediaCatalog {
        inner: Arc<WikimediaInner>,
    }

    struct WikimediaInner {
        client: reqwest::Client,
        popular: MonthlyCache,
    }

    impl WikimediaCatalog {
        /// Build the HTTP client; no request is sent until a topic is needed.
        pub fn new() -> Result<Self, TopicError> {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|err| TopicError::Catalog(err.to_string()))?;
            Ok(Self {
                inner: Arc::new(WikimediaInner {
                    client,
                    popular: MonthlyCache::default(),
                }),
            })
        }
    }

    impl WikimediaInner {
        async fn popular(&self) -> Result<Arc<Vec<String>>, TopicError> {
            let month = previous_month(OffsetDateTime::now_utc());
            self.popular
                .get_or_fetch(month, |(year, month)| async move {
                    let url = format!("{TOP_VIEWS_BASE}/{year}/{month:02}/all-days");
                    let response: TopViewsResponse = self
                        .client
                        .get(&url)
                        .send()
                        .await
                        .and_then(reqwest::Response::error_for_status)
                        .map_err(|err| TopicError::Catalog(err.to_string()))?
                        .json()
                        .await
                        .map_err(|err| TopicError::Catalog(err.to_string()))?;
                    let titles = popular_titles(response);
                    info!(year, month, count = titles.len(), "loaded popular topics");
                    Ok::<_, TopicError>(titles)
                })
                .await
        }

        async fn exists(&self, topic: &str) -> Result<bool, TopicError> {
            let response: QueryResponse = self
                .client
                .get(QUERY_API)
                .query(&[
                    ("action", "query"),
                    ("format", "json"),
                    ("formatversion", "2"),
                    ("titles", topic),
                ])
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|err| TopicError::Catalog(err.to_string()))?
                .json()
                .await
                .map_err(|err| TopicError::Catalog(err.to_string()))?;
            Ok(page_exists(&response))
        }
    }

    impl TopicCatalog for WikimediaCatalog {
        fn random_popular_topic(&self) -> BoxFuture<'static, Result<String, TopicError>> {
            let inner = self.inner.clone();
            Box::pin(async move {
                let titles = inner.popular().await?;
                let pick = titles.choose(&mut rand::rng()).cloned();
                pick.ok_or(TopicError::EmptyCatalog)
            })
        }

        fn topic_exists(&self, topic: String) -> BoxFuture<'static, Result<bool, TopicError>> {
            let inner = self.inner.clone();
            Box::pin(async move { inner.exists(&topic).await })
        }
    }

    /// Year and month number of the month before `now`.
    pub(super) fn previous_month(now: OffsetDateTime) -> RankingMonth {
        match now.month() {
            Month::January => (now.year() - 1, 12),
            month => (now.year(), u8::from(month.previous())),
        }
    }

    /// Article titles from the ranking, without the main page or namespaced pages.
    pub(super) fn popular_titles(response: TopViewsResponse) -> Vec<String> {
        response
            .items
            .into_iter()
            .flat_map(|item| item.articles)
            .map(|article| article.article)
            .filter(|title| title != MAIN_PAGE && !title.contains(':'))
            .take(POPULAR_LIMIT)
            .collect()
    }

    pub(super) fn page_exists(response: &QueryResponse) -> bool {
        response
            .query
            .pages
            .first()
            .is_some_and(|page| !page.missing && !page.invalid)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use super::*;

    /// Catalog replaying a scripted sequence of draws.
    struct ScriptedCatalog {
        draws: Mutex<VecDeque<&'static str>>,
        missing: &'static [&'static str],
    }

    impl ScriptedCatalog {
        fn new(draws: &[&'static str], missing: &'static [&'static str]) -> Arc<Self> {
            Arc::new(Self {
                draws: Mutex::new(draws.iter().copied().collect()),
                missing,
            })
        }
    }

    impl TopicCatalog for ScriptedCatalog {
        fn random_popular_topic(&self) -> BoxFuture<'static, Result<String, TopicError>> {
            let next = self.draws.lock().unwrap().pop_front();
            Box::pin(async move { next.map(String::from).ok_or(TopicError::EmptyCatalog) })
        }

        fn topic_exists(&self, topic: String) -> BoxFuture<'static, Result<bool, TopicError>> {
            let exists = !self.missing.contains(&topic.as_str());
            Box::pin(async move { Ok(exists) })
        }
    }

    #[tokio::test]
    async fn fixed_pair_is_returned_verbatim() {
        let selector = FixedTopicPair::new("Dog", "Cat").unwrap();
        let pair = selector.choose().await.unwrap();
        assert_eq!(pair.start, "Dog");
        assert_eq!(pair.target, "Cat");
    }

    #[test]
    fn fixed_pair_rejects_equal_topics() {
        assert_eq!(
            FixedTopicPair::new("Dog", " Dog ").unwrap_err(),
            TopicError::SameTopic("Dog".into())
        );
        assert_eq!(
            FixedTopicPair::new("", "Cat").unwrap_err(),
            TopicError::MissingFixedTopics
        );
    }

    #[tokio::test]
    async fn random_pair_redraws_duplicate_and_missing_targets() {
        let catalog = ScriptedCatalog::new(&["Dog", "Dog", "Ghost", "Cat"], &["Ghost"]);
        let pair = RandomTopicPair::new(catalog, 5).choose().await.unwrap();
        assert_eq!(
            pair,
            TopicPair {
                start: "Dog".into(),
                target: "Cat".into()
            }
        );
    }

    #[tokio::test]
    async fn random_pair_gives_up_after_max_draws() {
        let catalog = ScriptedCatalog::new(&["Dog", "Dog", "Dog", "Cat"], &[]);
        let err = RandomTopicPair::new(catalog, 2).choose().await.unwrap_err();
        assert_eq!(err, TopicError::Exhausted(2));
    }

    #[tokio::test]
    async fn static_catalog_pairs_are_distinct() {
        let catalog = Arc::new(StaticCatalog::new(["Dog".to_string(), "Cat".to_string()]));
        let selector = RandomTopicPair::new(catalog, 200);
        for _ in 0..20 {
            let pair = selector.choose().await.unwrap();
            assert_ne!(pair.start, pair.target);
        }
    }

    #[tokio::test]
    async fn empty_static_catalog_fails() {
        let catalog = Arc::new(StaticCatalog::new(Vec::new()));
        let err = RandomTopicPair::new(catalog, 3).choose().await.unwrap_err();
        assert_eq!(err, TopicError::EmptyCatalog);
    }

    #[tokio::test]
    async fn fixed_mode_requires_both_topics() {
        let mut config = TopicsConfig {
            mode: TopicMode::Fixed,
            fixed_start: Some("Dog".into()),
            ..TopicsConfig::default()
        };
        assert!(matches!(
            selector_from_config(&config),
            Err(TopicError::MissingFixedTopics)
        ));

        config.fixed_target = Some("Cat".into());
        let pair = selector_from_config(&config).unwrap().choose().await.unwrap();
        assert_eq!(pair.target, "Cat");
    }

    #[cfg(feature = "wikimedia-catalog")]
    mod wikimedia_parsing {
        use time::{Date, Month, OffsetDateTime};

        use std::sync::atomic::{AtomicU32, Ordering};

        use super::super::{
            TopicError,
            wikimedia::{MonthlyCache, page_exists, popular_titles, previous_month},
        };

        fn at(year: i32, month: Month, day: u8) -> OffsetDateTime {
            Date::from_calendar_date(year, month, day)
                .unwrap()
                .midnight()
                .assume_utc()
        }

        #[test]
        fn previous_month_rolls_over_the_year() {
            assert_eq!(previous_month(at(2026, Month::January, 15)), (2025, 12));
            assert_eq!(previous_month(at(2026, Month::October, 19)), (2026, 9));
        }

        #[tokio::test]
        async fn ranking_is_refetched_when_the_month_changes() {
            let cache = MonthlyCache::default();
            let fetches = AtomicU32::new(0);
            let fetch = |(year, month): (i32, u8)| {
                fetches.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, TopicError>(vec![format!("{year}-{month:02}")]) }
            };

            let september = cache.get_or_fetch((2026, 9), fetch).await.unwrap();
            let again = cache.get_or_fetch((2026, 9), fetch).await.unwrap();
            assert_eq!(*september, vec!["2026-09"]);
            assert_eq!(*again, vec!["2026-09"]);
            assert_eq!(fetches.load(Ordering::SeqCst), 1);

            let october = cache.get_or_fetch((2026, 10), fetch).await.unwrap();
            assert_eq!(*october, vec!["2026-10"]);
            assert_eq!(fetches.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn failed_fetch_is_not_cached() {
            let cache = MonthlyCache::default();
            let err = cache
                .get_or_fetch((2026, 9), |_| async {
                    Err::<Vec<String>, _>(TopicError::Catalog("offline".into()))
                })
                .await
                .unwrap_err();
            assert_eq!(err, TopicError::Catalog("offline".into()));

            let titles = cache
                .get_or_fetch((2026, 9), |_| async { Ok::<_, TopicError>(vec!["Dog".to_string()]) })
                .await
                .unwrap();
            assert_eq!(*titles, vec!["Dog"]);
        }

        #[test]
        fn namespaced_titles_and_main_page_are_skipped() {
            let response = serde_json::from_str(
                r#"{"items":[{"articles":[
                    {"article":"Main_Page","views":10,"rank":1},
                    {"article":"Special:Search","views":9,"rank":2},
                    {"article":"Dog","views":8,"rank":3},
                    {"article":"Cat","views":7,"rank":4}
                ]}]}"#,
            )
            .unwrap();
            assert_eq!(popular_titles(response), vec!["Dog", "Cat"]);
        }

        #[test]
        fn missing_pages_are_reported() {
            let missing = serde_json::from_str(
                r#"{"query":{"pages":[{"title":"Nope","missing":true}]}}"#,
            )
            .unwrap();
            let present = serde_json::from_str(
                r#"{"query":{"pages":[{"title":"Dog","pageid":1}]}}"#,
            )
            .unwrap();
            assert!(!page_exists(&missing));
            assert!(page_exists(&present));
        }
    }
}
