//! Density-based clustering of articles by headline embedding.
//!
//! Each article is reduced to a short text surrogate (title plus a bounded
//! summary prefix), embedded in one batched call, and paired with its vector
//! as an [`EmbeddedArticle`]. Pairs are then partitioned with DBSCAN over
//! cosine distance:
//!
//! - the neighbourhood of a point is every point (itself included) within
//!   `eps` cosine distance;
//! - a point with at least `min_pts` neighbours is a core point;
//! - clusters grow transitively through core points and absorb their
//!   neighbours; a border point belongs to the first cluster that reaches it;
//! - everything else is noise and is left out of the result.
//!
//! Points are visited in input order, so for identical vectors the output is
//! identical: clusters in discovery order, members in input order.

use crate::config::ClusteringConfig;
use crate::models::Article;
use crate::providers::Embedder;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// A non-empty group of related articles.
pub type Cluster = Vec<Article>;

/// An article carried together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedArticle {
    pub article: Article,
    pub vector: Vec<f32>,
}

/// `1 - cosine similarity`, clamped to `[0, 2]`.
///
/// A zero-length or zero-norm vector is treated as unrelated to everything
/// (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 1.0;
    }
    (1.0 - dot / denom).clamp(0.0, 2.0)
}

/// Full symmetric pairwise distance matrix.
pub fn distance_matrix(points: &[EmbeddedArticle]) -> Vec<Vec<f32>> {
    let n = points.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = cosine_distance(&points[i].vector, &points[j].vector);
            matrix[i][j] = d;
            matrix[j][i] = d;
        }
    }
    matrix
}

/// DBSCAN labels over a precomputed distance matrix. `None` marks noise.
pub fn dbscan(distances: &[Vec<f32>], eps: f32, min_pts: usize) -> Vec<Option<usize>> {
    let n = distances.len();
    let neighbours: Vec<Vec<usize>> = distances
        .iter()
        .map(|row| (0..n).filter(|&j| row[j] <= eps).collect())
        .collect();
    let is_core = |i: usize| neighbours[i].len() >= min_pts;

    let mut labels: Vec<Option<usize>> = vec![None; n];
    let mut next_label = 0;

    for i in 0..n {
        if labels[i].is_some() || !is_core(i) {
            continue;
        }
        let label = next_label;
        next_label += 1;
        labels[i] = Some(label);

        let mut queue: VecDeque<usize> = neighbours[i].iter().copied().collect();
        while let Some(j) = queue.pop_front() {
            if labels[j].is_some() {
                continue;
            }
            labels[j] = Some(label);
            if is_core(j) {
                queue.extend(neighbours[j].iter().copied().filter(|&k| labels[k].is_none()));
            }
        }
    }

    labels
}

/// Group embedded articles into clusters, dropping noise.
pub fn cluster_embedded(points: &[EmbeddedArticle], eps: f32, min_pts: usize) -> Vec<Cluster> {
    let labels = dbscan(&distance_matrix(points), eps, min_pts);
    let cluster_count = labels.iter().flatten().max().map_or(0, |max| max + 1);

    let mut clusters: Vec<Cluster> = vec![Vec::new(); cluster_count];
    for (point, label) in points.iter().zip(&labels) {
        if let Some(label) = label {
            clusters[*label].push(point.article.clone());
        }
    }
    clusters
}

/// Summary of the pairwise distances of a corpus, used to tune `eps`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceStats {
    pub pairs: usize,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: f32,
}

/// Statistics over the upper triangle of a distance matrix. `None` when
/// there are fewer than two points.
pub fn distance_stats(distances: &[Vec<f32>]) -> Option<DistanceStats> {
    let mut values: Vec<f32> = distances
        .iter()
        .enumerate()
        .flat_map(|(i, row)| row.iter().skip(i + 1).copied())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);

    let pairs = values.len();
    let median = if pairs % 2 == 1 {
        values[pairs / 2]
    } else {
        (values[pairs / 2 - 1] + values[pairs / 2]) / 2.0
    };
    Some(DistanceStats {
        pairs,
        min: values[0],
        max: values[pairs - 1],
        mean: values.iter().sum::<f32>() / pairs as f32,
        median,
    })
}

/// Embeds and clusters articles using a configured [`Embedder`].
#[derive(Debug)]
pub struct ArticleClusterer<E> {
    embedder: E,
    params: ClusteringConfig,
}

impl<E: Embedder> ArticleClusterer<E> {
    pub fn new(embedder: E, params: ClusteringConfig) -> Self {
        Self { embedder, params }
    }

    pub fn params(&self) -> &ClusteringConfig {
        &self.params
    }

    /// Pair every article with its embedding.
    ///
    /// Any provider failure, including a response of the wrong length,
    /// yields an empty list.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn embed(&self, articles: &[Article]) -> Vec<EmbeddedArticle> {
        if articles.is_empty() {
            return Vec::new();
        }

        let corpus: Vec<String> = articles
            .iter()
            .map(|a| a.embedding_text(self.params.summary_prefix_chars))
            .collect();

        let vectors = match self.embedder.embed(&corpus).await {
            Ok(vectors) => vectors,
            Err(e) => {
                warn!(error = %e, "Embedding failed; treating run as having no clusters");
                return Vec::new();
            }
        };
        if vectors.len() != articles.len() {
            warn!(
                expected = articles.len(),
                got = vectors.len(),
                "Embedding count does not match article count; ignoring vectors"
            );
            return Vec::new();
        }

        articles
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(article, vector)| EmbeddedArticle { article, vector })
            .collect()
    }

    /// Cluster `articles`. Returns an empty list when embeddings are
    /// unavailable.
    #[instrument(level = "info", skip_all, fields(count = articles.len(), eps = self.params.eps, min_pts = self.params.min_pts))]
    pub async fn cluster(&self, articles: &[Article]) -> Vec<Cluster> {
        let points = self.embed(articles).await;
        if points.is_empty() {
            return Vec::new();
        }

        let t0 = Instant::now();
        let clusters = cluster_embedded(&points, self.params.eps, self.params.min_pts);
        let clustered: usize = clusters.iter().map(Vec::len).sum();
        debug!(sizes = ?clusters.iter().map(Vec::len).collect::<Vec<_>>(), "Cluster sizes");
        info!(
            clusters = clusters.len(),
            clustered,
            noise = points.len() - clustered,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Clustered articles"
        );
        clusters
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{TableEmbedder, near};
    use super::*;
    use crate::models::fixtures::article;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    fn embedded(vectors: Vec<Vec<f32>>) -> Vec<EmbeddedArticle> {
        vectors
            .into_iter()
            .enumerate()
            .map(|(i, vector)| EmbeddedArticle {
                article: article(i, &format!("Article {i}"), i as i64),
                vector,
            })
            .collect()
    }

    #[test]
    fn test_cosine_distance_basics() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_small_inputs_have_no_clusters() {
        assert!(cluster_embedded(&[], 0.2, 3).is_empty());
        assert!(cluster_embedded(&embedded(vec![near(0, 0.0, 4)]), 0.2, 3).is_empty());
        assert!(cluster_embedded(&embedded(vec![near(0, 0.0, 4); 2]), 0.2, 3).is_empty());
    }

    #[test]
    fn test_min_pts_one_makes_every_point_a_cluster() {
        let points = embedded(vec![near(0, 0.0, 4), near(1, 0.0, 4), near(2, 0.0, 4)]);
        let clusters = cluster_embedded(&points, 0.2, 1);
        assert_eq!(clusters.len(), 3);
        assert!(clusters.iter().all(|c| c.len() == 1));
    }

    #[test]
    fn test_two_groups_and_noise() {
        let points = embedded(vec![
            near(0, 0.05, 6),
            near(3, 0.0, 6),
            near(0, 0.10, 6),
            near(3, 0.05, 6),
            near(5, 0.0, 6),
            near(0, 0.00, 6),
            near(3, 0.10, 6),
            near(3, 0.02, 6),
        ]);
        let clusters = cluster_embedded(&points, 0.2, 3);
        let titles: Vec<Vec<&str>> = clusters
            .iter()
            .map(|c| c.iter().map(|a| a.title.as_str()).collect())
            .collect();
        assert_eq!(
            titles,
            vec![
                vec!["Article 0", "Article 2", "Article 5"],
                vec!["Article 1", "Article 3", "Article 6", "Article 7"],
            ]
        );
    }

    #[test]
    fn test_border_point_is_absorbed_but_not_expanded() {
        // 3 is only near 2, so it joins cluster 0 without being a core point.
        // 4 and 5 are close to each other but too few to form a cluster.
        let labels = dbscan(
            &[
                vec![0.0, 0.1, 0.1, 0.5, 0.5, 0.5],
                vec![0.1, 0.0, 0.1, 0.5, 0.5, 0.5],
                vec![0.1, 0.1, 0.0, 0.15, 0.5, 0.5],
                vec![0.5, 0.5, 0.15, 0.0, 0.5, 0.5],
                vec![0.5, 0.5, 0.5, 0.5, 0.0, 0.1],
                vec![0.5, 0.5, 0.5, 0.5, 0.1, 0.0],
            ],
            0.2,
            3,
        );
        assert_eq!(labels, vec![Some(0), Some(0), Some(0), Some(0), None, None]);
    }

    #[test]
    fn test_clusters_are_disjoint_subsets_for_any_size() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 0..40 {
            let vectors: Vec<Vec<f32>> = (0..n)
                .map(|_| {
                    let axis = rng.random_range(0..4);
                    near(axis, rng.random_range(0.0..0.6), 4)
                })
                .collect();
            let points = embedded(vectors);
            let clusters = cluster_embedded(&points, 0.1, 3);

            let mut seen = HashSet::new();
            for cluster in &clusters {
                assert!(!cluster.is_empty());
                for a in cluster {
                    assert!(points.iter().any(|p| p.article == *a));
                    assert!(seen.insert(a.id.clone()), "article in two clusters");
                }
            }
        }
    }

    #[test]
    fn test_distance_stats() {
        let matrix = vec![
            vec![0.0, 0.1, 0.4],
            vec![0.1, 0.0, 0.3],
            vec![0.4, 0.3, 0.0],
        ];
        let stats = distance_stats(&matrix).unwrap();
        assert_eq!(stats.pairs, 3);
        assert_eq!(stats.min, 0.1);
        assert_eq!(stats.max, 0.4);
        assert_eq!(stats.median, 0.3);
        assert!((stats.mean - 0.8 / 3.0).abs() < 1e-6);
        assert!(distance_stats(&[vec![0.0]]).is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_yields_no_clusters() {
        let embedder = TableEmbedder {
            fail: true,
            ..Default::default()
        };
        let clusterer = ArticleClusterer::new(embedder, ClusteringConfig::default());
        let articles: Vec<_> = (0..6).map(|i| article(i, "Same story", 0)).collect();
        assert!(clusterer.cluster(&articles).await.is_empty());
    }

    #[tokio::test]
    async fn test_short_embedding_response_yields_no_clusters() {
        let mut embedder = TableEmbedder::new([("Same story".to_string(), near(0, 0.0, 3))]);
        embedder.short = true;
        let clusterer = ArticleClusterer::new(embedder, ClusteringConfig::default());
        let articles: Vec<_> = (0..6).map(|i| article(i, "Same story", 0)).collect();

        assert!(clusterer.embed(&articles).await.is_empty());
        assert!(clusterer.cluster(&articles).await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let clusterer = ArticleClusterer::new(
            TableEmbedder {
                fail: true,
                ..Default::default()
            },
            ClusteringConfig::default(),
        );
        assert!(clusterer.embed(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_pairs_articles_with_their_vectors() {
        let embedder = TableEmbedder::new([
            ("Quake".to_string(), near(0, 0.0, 3)),
            ("Aftershock".to_string(), near(0, 0.1, 3)),
            ("Rescue".to_string(), near(0, 0.05, 3)),
            ("Recipe".to_string(), near(2, 0.0, 3)),
        ]);
        let clusterer = ArticleClusterer::new(embedder, ClusteringConfig::default());
        let articles = vec![
            article(0, "Recipe", 0),
            article(1, "Quake", 1),
            article(2, "Aftershock", 2),
            article(3, "Rescue", 3),
        ];
        let clusters = clusterer.cluster(&articles).await;
        assert_eq!(clusters, vec![articles[1..].to_vec()]);
    }
}
