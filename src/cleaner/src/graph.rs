//! Links container manifest lists to the per-architecture images they reference.
//!
//! The registry lists manifest lists and images as unrelated packages. The
//! only way to find out which images belong to a manifest list is to fetch the
//! manifest from the container registry and match its digests against the
//! `version` (digest) of every image in the inventory.
//!
//! Lookups run concurrently in bounded batches; batches run one after another.
//! Links are only written once every lookup succeeded, so a failed build never
//! leaves a partial graph behind.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;

use crate::model::{ArtifactId, ArtifactKind, Snapshot, strip_digest_prefix};
use crate::ports::{DigestResolution, DigestResolver, ManifestCoordinates};

/// Default number of manifest lookups in flight at once.
pub const DEFAULT_RESOLVE_BATCH_SIZE: usize = 25;

/// Settings for the manifest graph builder.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    /// Maximum concurrent manifest lookups.
    pub batch_size: usize,
    /// Namespace used when an inventory record carries none.
    pub default_namespace: String,
    /// Repository used when an inventory record carries none.
    pub default_repository: String,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_RESOLVE_BATCH_SIZE,
            default_namespace: String::new(),
            default_repository: String::new(),
        }
    }
}

/// Counters describing one graph build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Manifest lists found in the inventory.
    pub manifest_lists: usize,
    /// Manifest lists whose manifest was fetched.
    pub resolved: usize,
    /// Manifest lists the registry no longer knows about.
    pub not_found: usize,
    /// Manifest lists that could not be addressed (no digest).
    pub unaddressable: usize,
    /// Images linked as children.
    pub linked_children: usize,
    /// References to images already owned by an earlier manifest list.
    pub shared_references: usize,
}

/// A manifest lookup failed for a reason other than "not found".
#[derive(Debug, Error)]
#[error("Failed to resolve manifest digests for {manifest} ({coordinates})")]
pub struct ResolutionError {
    pub manifest: String,
    pub coordinates: ManifestCoordinates,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Builds parent/child links between manifest lists and images.
pub struct ManifestGraphBuilder {
    resolver: Arc<dyn DigestResolver>,
    settings: GraphSettings,
}

impl ManifestGraphBuilder {
    pub fn new(resolver: Arc<dyn DigestResolver>, settings: GraphSettings) -> Self {
        Self { resolver, settings }
    }

    /// Resolve every manifest list in the snapshot and link its images.
    ///
    /// Existing links are discarded first, so building twice against an
    /// unchanged registry yields the same graph. An image referenced by more
    /// than one manifest list belongs to the first one in inventory order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ResolutionError`] encountered. The snapshot is left
    /// without any links in that case.
    pub async fn build(&self, snapshot: &mut Snapshot) -> Result<GraphStats, ResolutionError> {
        snapshot.clear_links();

        let mut stats = GraphStats::default();
        let mut lookups = Vec::new();
        for (id, artifact) in snapshot.iter() {
            if artifact.kind() != ArtifactKind::ManifestList {
                continue;
            }
            stats.manifest_lists += 1;
            match self.coordinates(snapshot, id) {
                Some(coordinates) => lookups.push((id, coordinates)),
                None => {
                    stats.unaddressable += 1;
                    tracing::warn!(
                        manifest = %snapshot.describe(id),
                        "Manifest list has no digest, treating it as having no children"
                    );
                }
            }
        }

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = lookups.len().div_ceil(batch_size);
        let mut resolved: Vec<(ArtifactId, Vec<String>)> = Vec::with_capacity(lookups.len());

        for (batch_idx, batch) in lookups.chunks(batch_size).enumerate() {
            tracing::debug!(
                batch = batch_idx + 1,
                total_batches = total_batches,
                batch_size = batch.len(),
                "Resolving manifest batch"
            );

            let requests = batch.iter().map(|(id, coordinates)| async move {
                (
                    *id,
                    coordinates,
                    self.resolver.list_manifest_digests(coordinates).await,
                )
            });

            for (id, coordinates, result) in join_all(requests).await {
                match result {
                    Ok(DigestResolution::Found(digests)) => {
                        stats.resolved += 1;
                        resolved.push((id, digests));
                    }
                    Ok(DigestResolution::NotFound) => {
                        stats.not_found += 1;
                        tracing::warn!(
                            manifest = %snapshot.describe(id),
                            "Manifest data not found, treating it as having no children"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            manifest = %snapshot.describe(id),
                            coordinates = %coordinates,
                            error = %e,
                            "Manifest resolution failed"
                        );
                        return Err(ResolutionError {
                            manifest: snapshot.describe(id),
                            coordinates: coordinates.clone(),
                            source: e.into(),
                        });
                    }
                }
            }
        }

        let images_by_digest = index_images(snapshot);
        for (manifest, digests) in resolved {
            let matched: BTreeSet<ArtifactId> = digests
                .iter()
                .map(|digest| strip_digest_prefix(digest))
                .filter_map(|digest| images_by_digest.get(digest))
                .flatten()
                .copied()
                .collect();

            for image in matched {
                if snapshot.link(manifest, image) {
                    stats.linked_children += 1;
                } else {
                    stats.shared_references += 1;
                    tracing::warn!(
                        manifest = %snapshot.describe(manifest),
                        image = %snapshot.describe(image),
                        "Image already belongs to another manifest list, not linking it again"
                    );
                }
            }
        }

        tracing::info!(
            manifest_lists = stats.manifest_lists,
            resolved = stats.resolved,
            not_found = stats.not_found,
            unaddressable = stats.unaddressable,
            linked_children = stats.linked_children,
            shared_references = stats.shared_references,
            "Manifest graph built"
        );

        Ok(stats)
    }

    fn coordinates(&self, snapshot: &Snapshot, id: ArtifactId) -> Option<ManifestCoordinates> {
        let artifact = snapshot.get(id);
        let digest = artifact.digest()?;
        Some(ManifestCoordinates {
            namespace: artifact
                .namespace
                .clone()
                .unwrap_or_else(|| self.settings.default_namespace.clone()),
            repository: artifact
                .repository
                .clone()
                .unwrap_or_else(|| self.settings.default_repository.clone()),
            name: artifact.name.clone(),
            digest: digest.to_string(),
        })
    }
}

/// Container images keyed by digest, in inventory order.
fn index_images(snapshot: &Snapshot) -> HashMap<String, Vec<ArtifactId>> {
    let mut index: HashMap<String, Vec<ArtifactId>> = HashMap::new();
    for (id, artifact) in snapshot.iter() {
        if artifact.kind() != ArtifactKind::Image {
            continue;
        }
        if let Some(digest) = artifact.digest() {
            index.entry(digest.to_string()).or_default().push(id);
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::snapshot::test_support::*;
    use crate::ports::MockDigestResolver;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Resolver backed by a fixed digest table that records peak concurrency.
    struct TableResolver {
        table: HashMap<String, DigestResolution>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl TableResolver {
        fn new(entries: &[(&str, Option<&[&str]>)]) -> Self {
            let table = entries
                .iter()
                .map(|(digest, found)| {
                    let resolution = match found {
                        Some(digests) => DigestResolution::Found(
                            digests.iter().map(|d| d.to_string()).collect(),
                        ),
                        None => DigestResolution::NotFound,
                    };
                    (digest.to_string(), resolution)
                })
                .collect();
            Self {
                table,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl DigestResolver for TableResolver {
        async fn list_manifest_digests(
            &self,
            coordinates: &ManifestCoordinates,
        ) -> anyhow::Result<DigestResolution> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(coordinates.path());

            tokio::time::sleep(Duration::from_millis(5)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self
                .table
                .get(&coordinates.digest)
                .cloned()
                .unwrap_or(DigestResolution::Found(vec![])))
        }
    }

    fn builder(resolver: Arc<dyn DigestResolver>, batch_size: usize) -> ManifestGraphBuilder {
        ManifestGraphBuilder::new(
            resolver,
            GraphSettings {
                batch_size,
                ..Default::default()
            },
        )
    }

    fn scenario() -> Snapshot {
        Snapshot::new(vec![
            manifest_list("A", "app", "v1-SNAPSHOT", "aaa", 40),
            image("B", "app", "bbb", 40),
            image("C", "app", "ccc", 40),
            image("D", "app", "ddd", 40),
            npm("N", "pkgX", "bbb", 40),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_links_images_by_digest() {
        let resolver = Arc::new(TableResolver::new(&[(
            "aaa",
            Some(&["sha256:bbb", "sha256:ccc"][..]),
        )]));
        let mut snapshot = scenario();

        let stats = builder(resolver.clone(), 25)
            .build(&mut snapshot)
            .await
            .unwrap();

        let a = snapshot.find("A").unwrap();
        let b = snapshot.find("B").unwrap();
        let c = snapshot.find("C").unwrap();
        let d = snapshot.find("D").unwrap();
        let n = snapshot.find("N").unwrap();

        assert_eq!(snapshot.children(a), &[b, c]);
        assert_eq!(snapshot.parent(b), Some(a));
        assert_eq!(snapshot.parent(c), Some(a));
        assert_eq!(snapshot.parent(d), None);
        // Only container images are matched, even if another format shares the value.
        assert_eq!(snapshot.parent(n), None);

        assert_eq!(stats.manifest_lists, 1);
        assert_eq!(stats.resolved, 1);
        assert_eq!(stats.linked_children, 2);
        assert_eq!(
            resolver.calls.lock().unwrap().as_slice(),
            &["acme/releases/app/manifests/sha256:aaa".to_string()]
        );
    }

    #[tokio::test]
    async fn test_not_found_yields_no_children() {
        let resolver = Arc::new(TableResolver::new(&[("aaa", None)]));
        let mut snapshot = scenario();

        let stats = builder(resolver, 25).build(&mut snapshot).await.unwrap();

        let a = snapshot.find("A").unwrap();
        assert!(snapshot.children(a).is_empty());
        assert_eq!(stats.not_found, 1);
        assert_eq!(stats.linked_children, 0);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_without_links() {
        let mut resolver = MockDigestResolver::new();
        resolver
            .expect_list_manifest_digests()
            .returning(|coordinates| {
                if coordinates.digest == "aaa" {
                    Ok(DigestResolution::Found(vec!["bbb".to_string()]))
                } else {
                    Err(anyhow::anyhow!("502 Bad Gateway"))
                }
            });

        let mut snapshot = Snapshot::new(vec![
            manifest_list("A", "app", "v1", "aaa", 40),
            manifest_list("E", "app", "v2", "eee", 40),
            image("B", "app", "bbb", 40),
        ])
        .unwrap();

        let err = builder(Arc::new(resolver), 1)
            .build(&mut snapshot)
            .await
            .unwrap_err();

        assert_eq!(err.coordinates.digest, "eee");
        assert!(err.source.to_string().contains("502"));
        let a = snapshot.find("A").unwrap();
        assert!(snapshot.children(a).is_empty(), "no partial graph");
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let resolver = Arc::new(TableResolver::new(&[(
            "aaa",
            Some(&["bbb", "ccc"][..]),
        )]));
        let mut snapshot = scenario();
        let builder = builder(resolver, 25);

        let first_stats = builder.build(&mut snapshot).await.unwrap();
        let first: Vec<_> = snapshot
            .ids()
            .map(|id| (snapshot.parent(id), snapshot.children(id).to_vec()))
            .collect();

        let second_stats = builder.build(&mut snapshot).await.unwrap();
        let second: Vec<_> = snapshot
            .ids()
            .map(|id| (snapshot.parent(id), snapshot.children(id).to_vec()))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first_stats, second_stats);
    }

    #[tokio::test]
    async fn test_shared_image_belongs_to_first_manifest() {
        let resolver = Arc::new(TableResolver::new(&[
            ("aaa", Some(&["bbb"][..])),
            ("eee", Some(&["bbb", "ccc"][..])),
        ]));
        let mut snapshot = Snapshot::new(vec![
            manifest_list("A", "app", "v1", "aaa", 40),
            manifest_list("E", "app", "v1-latest", "eee", 40),
            image("B", "app", "bbb", 40),
            image("C", "app", "ccc", 40),
        ])
        .unwrap();

        let stats = builder(resolver, 25).build(&mut snapshot).await.unwrap();

        let a = snapshot.find("A").unwrap();
        let e = snapshot.find("E").unwrap();
        let b = snapshot.find("B").unwrap();
        let c = snapshot.find("C").unwrap();
        assert_eq!(snapshot.children(a), &[b]);
        assert_eq!(snapshot.children(e), &[c]);
        assert_eq!(snapshot.parent(b), Some(a));
        assert_eq!(stats.shared_references, 1);
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency() {
        let mut artifacts = Vec::new();
        for i in 0..12 {
            artifacts.push(manifest_list(
                &format!("ml{i}"),
                "app",
                &format!("v{i}"),
                &format!("digest{i}"),
                40,
            ));
        }
        let mut snapshot = Snapshot::new(artifacts).unwrap();
        let resolver = Arc::new(TableResolver::new(&[]));

        let stats = builder(resolver.clone(), 5)
            .build(&mut snapshot)
            .await
            .unwrap();

        assert_eq!(stats.resolved, 12);
        assert_eq!(resolver.calls.lock().unwrap().len(), 12);
        let peak = resolver.peak.load(Ordering::SeqCst);
        assert!(peak <= 5, "peak concurrency {peak} exceeds batch size");
        assert!(peak > 1, "lookups within a batch should overlap");
    }

    #[tokio::test]
    async fn test_manifest_without_digest_is_skipped() {
        let mut manifest = manifest_list("A", "app", "v1", "", 40);
        manifest.version = None;
        let mut snapshot = Snapshot::new(vec![manifest, image("B", "app", "bbb", 40)]).unwrap();

        let mut resolver = MockDigestResolver::new();
        resolver.expect_list_manifest_digests().never();

        let stats = builder(Arc::new(resolver), 25)
            .build(&mut snapshot)
            .await
            .unwrap();

        assert_eq!(stats.unaddressable, 1);
        assert_eq!(stats.resolved, 0);
    }
}
