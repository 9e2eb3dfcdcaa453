//! Tiered choice of what to brief about.
//!
//! First match wins:
//!
//! 1. **Trend**: the largest cluster with at least `significant_threshold` articles.
//! 2. **Emerging**: the largest cluster with `emerging_min..significant_threshold` articles.
//! 3. **Fallback**: the `fallback_count` most recently published articles.
//!
//! Equally large clusters are ranked by their earliest publish time (earlier
//! wins), then by the order the clusterer returned them.

use crate::clustering::Cluster;
use crate::config::SelectionConfig;
use crate::models::{Article, Tier};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use tracing::{debug, info, instrument};

fn earliest_published(cluster: &Cluster) -> Option<DateTime<Utc>> {
    cluster.iter().map(|a| a.published).min()
}

/// The largest cluster whose size is in `range`, tie-broken deterministically.
fn largest_in<'a>(
    clusters: &'a [Cluster],
    range: impl std::ops::RangeBounds<usize>,
) -> Option<&'a Cluster> {
    clusters
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_empty() && range.contains(&c.len()))
        // min_by_key keeps the first of equal keys, i.e. partition order.
        .min_by_key(|(idx, c)| (Reverse(c.len()), earliest_published(c), *idx))
        .map(|(_, c)| c)
}

/// The `count` most recent articles, newest first. Equal timestamps keep
/// their input order.
pub fn most_recent(articles: &[Article], count: usize) -> Vec<Article> {
    let mut sorted = articles.to_vec();
    sorted.sort_by(|a, b| b.published.cmp(&a.published));
    sorted.truncate(count);
    sorted
}

/// Pick the tier and article subset to brief. Returns `None` when there are
/// no articles at all.
#[instrument(level = "info", skip_all, fields(articles = all_articles.len(), clusters = clusters.len()))]
pub fn select_briefing_target(
    all_articles: &[Article],
    clusters: &[Cluster],
    params: &SelectionConfig,
) -> Option<(Tier, Vec<Article>)> {
    if all_articles.is_empty() {
        debug!("No articles; no tier applies");
        return None;
    }

    let significant = params.significant_threshold;
    if let Some(cluster) = largest_in(clusters, significant..) {
        info!(size = cluster.len(), "Selected trend cluster");
        return Some((Tier::Trend, cluster.clone()));
    }
    if let Some(cluster) = largest_in(clusters, params.emerging_min..significant) {
        info!(size = cluster.len(), "No trend; selected emerging cluster");
        return Some((Tier::Emerging, cluster.clone()));
    }

    let latest = most_recent(all_articles, params.fallback_count);
    info!(count = latest.len(), "No clusters; falling back to latest articles");
    Some((Tier::Fallback, latest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::article;

    fn cluster(start: usize, size: usize, minutes_ago: i64) -> Cluster {
        (start..start + size)
            .map(|i| article(i, &format!("Story {i}"), minutes_ago + i as i64))
            .collect()
    }

    fn all_of(clusters: &[Cluster]) -> Vec<Article> {
        clusters.iter().flatten().cloned().collect()
    }

    #[test]
    fn test_trend_picks_largest_significant_cluster() {
        let clusters = vec![cluster(0, 3, 0), cluster(10, 7, 0), cluster(20, 1, 0)];
        let (tier, picked) =
            select_briefing_target(&all_of(&clusters), &clusters, &SelectionConfig::default()).unwrap();
        assert_eq!(tier, Tier::Trend);
        assert_eq!(picked, clusters[1]);
    }

    #[test]
    fn test_emerging_when_nothing_significant() {
        let clusters = vec![cluster(0, 2, 0), cluster(10, 4, 0)];
        let (tier, picked) =
            select_briefing_target(&all_of(&clusters), &clusters, &SelectionConfig::default()).unwrap();
        assert_eq!(tier, Tier::Emerging);
        assert_eq!(picked.len(), 4);
        assert_eq!(picked, clusters[1]);
    }

    #[test]
    fn test_fallback_takes_most_recent() {
        let articles: Vec<Article> = [30, 5, 90, 1, 60, 15, 45, 120]
            .iter()
            .enumerate()
            .map(|(i, &ago)| article(i, &format!("Story {i}"), ago))
            .collect();
        let (tier, picked) =
            select_briefing_target(&articles, &[], &SelectionConfig::default()).unwrap();
        assert_eq!(tier, Tier::Fallback);
        let ids: Vec<usize> = picked
            .iter()
            .map(|a| a.title.trim_start_matches("Story ").parse().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 1, 5, 0, 6]);
    }

    #[test]
    fn test_fallback_with_fewer_articles_than_count() {
        let articles = vec![article(0, "a", 10), article(1, "b", 5)];
        let (_, picked) = select_briefing_target(&articles, &[], &SelectionConfig::default()).unwrap();
        assert_eq!(picked, vec![articles[1].clone(), articles[0].clone()]);
    }

    #[test]
    fn test_singleton_clusters_do_not_count() {
        let clusters = vec![cluster(0, 1, 0)];
        let (tier, _) =
            select_briefing_target(&all_of(&clusters), &clusters, &SelectionConfig::default()).unwrap();
        assert_eq!(tier, Tier::Fallback);
    }

    #[test]
    fn test_tie_broken_by_earliest_publish_time() {
        // Same size; the second cluster has the older first article.
        let clusters = vec![cluster(0, 5, 10), cluster(10, 5, 100)];
        let (_, picked) =
            select_briefing_target(&all_of(&clusters), &clusters, &SelectionConfig::default()).unwrap();
        assert_eq!(picked, clusters[1]);
    }

    #[test]
    fn test_full_tie_keeps_partition_order() {
        let a = cluster(0, 3, 0);
        let mut b = cluster(10, 3, 0);
        for (x, y) in b.iter_mut().zip(&a) {
            x.published = y.published;
        }
        let clusters = vec![a, b];
        let (_, picked) =
            select_briefing_target(&all_of(&clusters), &clusters, &SelectionConfig::default()).unwrap();
        assert_eq!(picked, clusters[0]);
    }

    #[test]
    fn test_selection_is_idempotent() {
        let clusters = vec![cluster(0, 4, 3), cluster(10, 4, 3), cluster(20, 2, 0)];
        let articles = all_of(&clusters);
        let params = SelectionConfig::default();
        let first = select_briefing_target(&articles, &clusters, &params);
        for _ in 0..5 {
            assert_eq!(select_briefing_target(&articles, &clusters, &params), first);
        }
    }

    #[test]
    fn test_no_articles_no_tier() {
        assert!(select_briefing_target(&[], &[], &SelectionConfig::default()).is_none());
    }

    #[test]
    fn test_custom_thresholds() {
        let params = SelectionConfig {
            significant_threshold: 3,
            emerging_min: 3,
            fallback_count: 2,
        };
        let clusters = vec![cluster(0, 2, 0)];
        let (tier, picked) = select_briefing_target(&all_of(&clusters), &clusters, &params).unwrap();
        assert_eq!(tier, Tier::Fallback);
        assert_eq!(picked.len(), 2);
    }
}
