//! The resource tree: a table of open roots and locator resolution over them.
//!
//! Every node belongs to exactly one root. Roots are the base root (a plain
//! provider, label `""`), scheme roots (`file://`, `mem://name`), layered
//! roots built from file contents (`img:<file>!`) and virtual roots that
//! remap a folder as a new top level (`vroot:<folder>!`).
//!
//! Non-base roots are reference counted. Each open or creation hands the
//! caller one hold, and a root is dropped when its last hold is released
//! through [`ResourceTree::close_filesystem`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;
use vsh_sdk::{FileInfo, FsError, FsProvider, FsResult};

use crate::image::LayerFormats;
use crate::path::{is_within, join_path, parent_path, rebase_path};
use crate::providers::{default_registry, ProviderConfig, ProviderRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RootId(u64);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A location inside one root. Nodes are plain values; they do not keep the
/// root alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Node {
    root: RootId,
    label: Arc<str>,
    path: String,
}

impl Node {
    #[must_use]
    pub const fn root_id(&self) -> RootId {
        self.root
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    /// The top node of this node's root.
    #[must_use]
    pub fn root(&self) -> Self {
        self.with_path("/".to_string())
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        parent_path(&self.path).map(|p| self.with_path(p))
    }

    /// Resolves `relative` against this node, staying in the same root.
    #[must_use]
    pub fn join(&self, relative: &str) -> Self {
        self.with_path(join_path(&self.path, relative))
    }

    /// True if `other` is this node or lies below it.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.root == other.root && is_within(&self.path, &other.path)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self.path.rsplit('/').next() {
            Some("") | None => "/",
            Some(name) => name,
        }
    }

    fn with_path(&self, path: String) -> Self {
        Self {
            root: self.root,
            label: Arc::clone(&self.label),
            path,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.label, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Base,
    Scheme,
    Layered,
    Virtual,
}

struct RootEntry {
    label: Arc<str>,
    kind: RootKind,
    provider: Arc<dyn FsProvider>,
    /// Provider path that this root's `/` maps onto.
    base: String,
    /// The node this root was opened from.
    source: Option<Node>,
    holds: usize,
}

impl fmt::Debug for RootEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootEntry")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .field("base", &self.base)
            .field("holds", &self.holds)
            .finish_non_exhaustive()
    }
}

/// A resolved locator. `created` is the scheme root resolution had to
/// create; the caller owns its hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub node: Node,
    pub created: Option<Node>,
}

pub struct ResourceTree {
    roots: RwLock<BTreeMap<RootId, RootEntry>>,
    base: RootId,
    next_id: AtomicU64,
    registry: ProviderRegistry,
    formats: LayerFormats,
}

impl fmt::Debug for ResourceTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTree")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl ResourceTree {
    #[must_use]
    pub fn new(base: Arc<dyn FsProvider>) -> Self {
        Self::with_registry(base, default_registry(), LayerFormats::default())
    }

    #[must_use]
    pub fn with_registry(
        base: Arc<dyn FsProvider>,
        registry: ProviderRegistry,
        formats: LayerFormats,
    ) -> Self {
        let id = RootId(0);
        let mut roots = BTreeMap::new();
        roots.insert(
            id,
            RootEntry {
                label: Arc::from(""),
                kind: RootKind::Base,
                provider: base,
                base: "/".to_string(),
                source: None,
                holds: 0,
            },
        );
        Self {
            roots: RwLock::new(roots),
            base: id,
            next_id: AtomicU64::new(1),
            registry,
            formats,
        }
    }

    #[must_use]
    pub fn base_root(&self) -> Node {
        Node {
            root: self.base,
            label: Arc::from(""),
            path: "/".to_string(),
        }
    }

    /// Resolves `locator` to a node over the roots already open.
    /// Existence is not checked.
    ///
    /// Precedence: an open root's label, a `scheme://authority/path` locator,
    /// an absolute path within the root of `base`, a path relative to `base`.
    /// A scheme root that is not open fails with `not found`.
    pub async fn resolve(&self, locator: &str, base: &Node) -> FsResult<Node> {
        Ok(self.resolve_with(locator, base, false).await?.node)
    }

    /// Like [`resolve`](Self::resolve), but creates a missing scheme root.
    /// The created root is returned in [`Resolved::created`] and must be
    /// released by the caller.
    pub async fn resolve_creating(&self, locator: &str, base: &Node) -> FsResult<Resolved> {
        self.resolve_with(locator, base, true).await
    }

    async fn resolve_with(&self, locator: &str, base: &Node, create: bool) -> FsResult<Resolved> {
        let locator = locator.trim();
        let found = |node: Node| Resolved {
            node,
            created: None,
        };
        if locator.is_empty() {
            return Ok(found(base.clone()));
        }

        if let Some(node) = self.resolve_label(locator).await {
            return Ok(found(node));
        }

        if let Some((scheme, rest)) = locator.split_once("://") {
            let (authority, path) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, "/"),
            };
            let (root, created) = self.scheme_root(scheme, authority, create).await?;
            return Ok(Resolved {
                node: root.join(path),
                created: created.then_some(root),
            });
        }

        if locator.starts_with('/') {
            return Ok(found(base.root().join(locator)));
        }
        Ok(found(base.join(locator)))
    }

    async fn resolve_label(&self, locator: &str) -> Option<Node> {
        let roots = self.roots.read().await;
        roots
            .iter()
            .filter(|(_, entry)| !entry.label.is_empty())
            .filter_map(|(id, entry)| {
                let rest = locator.strip_prefix(&*entry.label)?;
                (rest.is_empty() || rest.starts_with('/')).then(|| Node {
                    root: *id,
                    label: Arc::clone(&entry.label),
                    path: join_path("/", rest),
                })
            })
            .max_by_key(|node| node.label.len())
    }

    /// The open root for `scheme://authority`, creating it with one hold
    /// when `create` is set. The flag reports whether it was created.
    async fn scheme_root(
        &self,
        scheme: &str,
        authority: &str,
        create: bool,
    ) -> FsResult<(Node, bool)> {
        let label = format!("{scheme}://{authority}");
        let mut roots = self.roots.write().await;
        if let Some((id, entry)) = roots.iter().find(|(_, e)| *e.label == *label) {
            return Ok((top_of(*id, entry), false));
        }

        if !self.registry.has(scheme) {
            return Err(FsError::unsupported_scheme(scheme));
        }
        if scheme == "file" && !authority.is_empty() {
            return Err(FsError::invalid_argument(format!(
                "file locators take no authority: {label}"
            )));
        }
        if !create {
            return Err(FsError::not_found(format!("{label}: not open")));
        }

        let provider = self.registry.create(scheme, ProviderConfig::new())?;
        let id = self.allocate();
        let entry = RootEntry {
            label: Arc::from(label),
            kind: RootKind::Scheme,
            provider,
            base: "/".to_string(),
            source: None,
            holds: 1,
        };
        debug!(root = %id, label = %entry.label, "created scheme root");
        let top = top_of(id, &entry);
        roots.insert(id, entry);
        Ok((top, true))
    }

    fn allocate(&self) -> RootId {
        RootId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Looks up the provider and provider path for `node`. The table lock is
    /// released before the caller awaits on the provider.
    async fn locate(&self, node: &Node) -> FsResult<(Arc<dyn FsProvider>, String)> {
        let roots = self.roots.read().await;
        let entry = roots
            .get(&node.root)
            .ok_or_else(|| FsError::not_found(format!("{node}: filesystem is closed")))?;
        Ok((Arc::clone(&entry.provider), rebase_path(&entry.base, &node.path)))
    }

    pub async fn stat(&self, node: &Node) -> FsResult<FileInfo> {
        let (provider, path) = self.locate(node).await?;
        let mut info = provider.stat(&path).await?;
        info.path = node.path.clone();
        Ok(info)
    }

    pub async fn exists(&self, node: &Node) -> bool {
        self.stat(node).await.is_ok()
    }

    pub async fn is_container(&self, node: &Node) -> bool {
        self.stat(node).await.is_ok_and(|info| info.is_dir())
    }

    /// Lists the children of a folder. Returned paths are relative to the
    /// node's root.
    pub async fn list(&self, node: &Node) -> FsResult<Vec<FileInfo>> {
        let (provider, path) = self.locate(node).await?;
        let mut entries = provider.readdir(&path).await?;
        for entry in &mut entries {
            entry.path = node.join(entry.name()).path;
        }
        Ok(entries)
    }

    pub async fn read(&self, node: &Node) -> FsResult<Bytes> {
        let (provider, path) = self.locate(node).await?;
        provider.read(&path).await
    }

    /// Mounts the contents of a file as a nested filesystem and returns its
    /// top node. Opening a file that is already layered returns the open
    /// root with one more hold.
    pub async fn open_layered(&self, node: &Node) -> FsResult<Node> {
        if let Some(open) = self.hold_opened(node, RootKind::Layered).await {
            return Ok(open);
        }

        let info = self.stat(node).await?;
        if info.is_dir() {
            return Err(FsError::is_directory(node.to_string()));
        }
        let factory = self
            .formats
            .for_path(&node.path)
            .ok_or_else(|| FsError::not_implemented(format!("{node}: no layer format")))?;
        let data = self.read(node).await?;
        let provider = factory(&data)?;

        let label = format!("img:{node}!");
        Ok(self
            .insert_opened(node, label, RootKind::Layered, provider, "/".to_string())
            .await)
    }

    /// Remaps a folder as the top of a new root sharing the folder's
    /// provider. Holds are counted like [`open_layered`](Self::open_layered).
    pub async fn open_virtual(&self, node: &Node) -> FsResult<Node> {
        if let Some(open) = self.hold_opened(node, RootKind::Virtual).await {
            return Ok(open);
        }

        if !self.is_container(node).await {
            return Err(FsError::not_directory(node.to_string()));
        }
        let (provider, path) = self.locate(node).await?;

        let label = format!("vroot:{node}!");
        Ok(self
            .insert_opened(node, label, RootKind::Virtual, provider, path)
            .await)
    }

    /// Adds a hold to an open root. Holding the base root is a no-op.
    pub async fn retain(&self, root: RootId) -> FsResult<()> {
        if root == self.base {
            return Ok(());
        }
        let mut roots = self.roots.write().await;
        let entry = roots
            .get_mut(&root)
            .ok_or_else(|| FsError::not_found(format!("filesystem {root}")))?;
        entry.holds += 1;
        Ok(())
    }

    async fn hold_opened(&self, source: &Node, kind: RootKind) -> Option<Node> {
        let mut roots = self.roots.write().await;
        let (id, entry) = roots
            .iter_mut()
            .find(|(_, e)| e.kind == kind && e.source.as_ref() == Some(source))?;
        entry.holds += 1;
        Some(top_of(*id, entry))
    }

    async fn insert_opened(
        &self,
        source: &Node,
        label: String,
        kind: RootKind,
        provider: Arc<dyn FsProvider>,
        base: String,
    ) -> Node {
        let mut roots = self.roots.write().await;
        // Another open of the same source may have finished while the
        // contents were being read.
        if let Some((id, entry)) = roots
            .iter_mut()
            .find(|(_, e)| e.kind == kind && e.source.as_ref() == Some(source))
        {
            entry.holds += 1;
            return top_of(*id, entry);
        }

        let id = self.allocate();
        let entry = RootEntry {
            label: Arc::from(label),
            kind,
            provider,
            base,
            source: Some(source.clone()),
            holds: 1,
        };
        debug!(root = %id, label = %entry.label, ?kind, "opened root");
        let top = top_of(id, &entry);
        roots.insert(id, entry);
        top
    }

    /// Releases one hold on a root and drops the root with its last hold.
    /// The base root cannot be closed.
    pub async fn close_filesystem(&self, root: RootId) -> FsResult<()> {
        if root == self.base {
            return Err(FsError::permission_denied("cannot close the base root"));
        }
        let mut roots = self.roots.write().await;
        let entry = roots
            .get_mut(&root)
            .ok_or_else(|| FsError::not_found(format!("filesystem {root}")))?;
        entry.holds = entry.holds.saturating_sub(1);
        if entry.holds == 0 {
            if let Some(entry) = roots.remove(&root) {
                debug!(root = %root, label = %entry.label, "closed root");
            }
        }
        Ok(())
    }

    /// Outstanding holds on an open root.
    pub async fn holds(&self, root: RootId) -> Option<usize> {
        self.roots.read().await.get(&root).map(|e| e.holds)
    }

    /// The node a layered or virtual root was opened from.
    pub async fn parent_layer(&self, root: RootId) -> Option<Node> {
        self.roots
            .read()
            .await
            .get(&root)
            .and_then(|e| e.source.clone())
    }

    pub async fn root_kind(&self, root: RootId) -> Option<RootKind> {
        self.roots.read().await.get(&root).map(|e| e.kind)
    }
}

fn top_of(id: RootId, entry: &RootEntry) -> Node {
    Node {
        root: id,
        label: Arc::clone(&entry.label),
        path: "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryFs;

    fn tree() -> ResourceTree {
        let base = MemoryFs::new();
        base.insert_file("/data/tree.json", r#"{"a.txt": "alpha", "sub": {"b.txt": "beta"}}"#)
            .unwrap();
        base.insert_file("/data/notes.txt", "plain").unwrap();
        base.insert_dir("/srv/www").unwrap();
        base.insert_file("/srv/www/index.html", "<html>").unwrap();
        ResourceTree::new(Arc::new(base))
    }

    #[tokio::test]
    async fn resolve_relative_and_absolute() {
        let tree = tree();
        let base = tree.base_root();
        let data = tree.resolve("/data", &base).await.unwrap();
        assert_eq!(data.to_string(), "/data");

        let notes = tree.resolve("notes.txt", &data).await.unwrap();
        assert_eq!(notes.path(), "/data/notes.txt");

        let up = tree.resolve("../../..", &data).await.unwrap();
        assert!(up.is_root());
        assert_eq!(tree.resolve("", &data).await.unwrap(), data);
    }

    #[tokio::test]
    async fn node_navigation() {
        let tree = tree();
        let node = tree.base_root().join("srv/www");
        assert_eq!(node.name(), "www");
        assert_eq!(node.parent().unwrap().path(), "/srv");
        assert!(node.root().contains(&node));
        assert!(!node.contains(&node.root()));
        assert!(tree.base_root().parent().is_none());
    }

    #[tokio::test]
    async fn layered_root_mounts_image() {
        let tree = tree();
        let file = tree.resolve("/data/tree.json", &tree.base_root()).await.unwrap();
        let root = tree.open_layered(&file).await.unwrap();
        assert_eq!(root.to_string(), "img:/data/tree.json!/");

        let beta = tree.resolve("img:/data/tree.json!/sub/b.txt", &tree.base_root()).await.unwrap();
        assert_eq!(&tree.read(&beta).await.unwrap()[..], b"beta");
        assert_eq!(tree.parent_layer(root.root_id()).await, Some(file.clone()));

        let again = tree.open_layered(&file).await.unwrap();
        assert_eq!(again.root_id(), root.root_id());
    }

    #[tokio::test]
    async fn absolute_paths_stay_in_root() {
        let tree = tree();
        let file = tree.resolve("/data/tree.json", &tree.base_root()).await.unwrap();
        let root = tree.open_layered(&file).await.unwrap();
        let sub = root.join("sub");

        let a = tree.resolve("/a.txt", &sub).await.unwrap();
        assert_eq!(a.root_id(), root.root_id());
        assert_eq!(&tree.read(&a).await.unwrap()[..], b"alpha");
    }

    #[tokio::test]
    async fn layered_requires_known_format() {
        let tree = tree();
        let notes = tree.resolve("/data/notes.txt", &tree.base_root()).await.unwrap();
        assert!(matches!(tree.open_layered(&notes).await, Err(FsError::NotImplemented(_))));

        let data = tree.resolve("/data", &tree.base_root()).await.unwrap();
        assert!(matches!(tree.open_layered(&data).await, Err(FsError::IsDirectory(_))));
    }

    #[tokio::test]
    async fn virtual_root_shares_provider() {
        let tree = tree();
        let www = tree.resolve("/srv/www", &tree.base_root()).await.unwrap();
        let root = tree.open_virtual(&www).await.unwrap();
        assert_eq!(root.to_string(), "vroot:/srv/www!/");

        let index = tree.resolve("/index.html", &root).await.unwrap();
        assert_eq!(&tree.read(&index).await.unwrap()[..], b"<html>");

        let listing = tree.list(&root).await.unwrap();
        let paths: Vec<&str> = listing.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["/index.html"]);
    }

    #[tokio::test]
    async fn scheme_root_created_once() {
        let tree = tree();
        let base = tree.base_root();
        let first = tree.resolve_creating("mem://scratch/x", &base).await.unwrap();
        assert_eq!(first.node.to_string(), "mem://scratch/x");
        let created = first.created.unwrap();
        assert!(created.is_root());
        assert_eq!(tree.root_kind(created.root_id()).await, Some(RootKind::Scheme));

        let again = tree.resolve_creating("mem://scratch/y", &base).await.unwrap();
        assert_eq!(again.node.root_id(), created.root_id());
        assert_eq!(again.created, None);
        assert_eq!(tree.holds(created.root_id()).await, Some(1));

        let other = tree.resolve_creating("mem://other", &base).await.unwrap();
        assert_ne!(other.node.root_id(), created.root_id());
        assert!(other.node.is_root());
    }

    #[tokio::test]
    async fn plain_resolve_never_creates_roots() {
        let tree = tree();
        let base = tree.base_root();
        let result = tree.resolve("mem://scratch/x", &base).await;
        assert!(matches!(result, Err(FsError::NotFound(_))));

        let created = tree.resolve_creating("mem://scratch", &base).await.unwrap();
        let found = tree.resolve("mem://scratch/x", &base).await.unwrap();
        assert_eq!(found.root_id(), created.node.root_id());
    }

    #[tokio::test]
    async fn unknown_scheme_fails() {
        let tree = tree();
        let result = tree.resolve("ftp://host/x", &tree.base_root()).await;
        assert!(matches!(result, Err(FsError::UnsupportedScheme(_))));
        let result = tree.resolve_creating("ftp://host/x", &tree.base_root()).await;
        assert!(matches!(result, Err(FsError::UnsupportedScheme(_))));
    }

    #[tokio::test]
    async fn close_releases_root() {
        let tree = tree();
        let node = tree
            .resolve_creating("mem://tmp", &tree.base_root())
            .await
            .unwrap()
            .node;
        tree.close_filesystem(node.root_id()).await.unwrap();

        assert_eq!(tree.root_kind(node.root_id()).await, None);
        assert!(tree.stat(&node).await.is_err());
        assert!(tree.close_filesystem(node.root_id()).await.is_err());
        assert!(tree.close_filesystem(tree.base_root().root_id()).await.is_err());
    }

    #[tokio::test]
    async fn root_survives_until_last_hold() {
        let tree = tree();
        let file = tree.resolve("/data/tree.json", &tree.base_root()).await.unwrap();
        let first = tree.open_layered(&file).await.unwrap();
        let second = tree.open_layered(&file).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(tree.holds(first.root_id()).await, Some(2));

        tree.close_filesystem(second.root_id()).await.unwrap();
        let a = tree.resolve("img:/data/tree.json!/a.txt", &tree.base_root()).await.unwrap();
        assert_eq!(&tree.read(&a).await.unwrap()[..], b"alpha");

        tree.close_filesystem(first.root_id()).await.unwrap();
        assert_eq!(tree.holds(first.root_id()).await, None);
        assert!(tree.read(&a).await.is_err());
    }

    #[tokio::test]
    async fn retain_adds_a_hold() {
        let tree = tree();
        let root = tree
            .resolve_creating("mem://shared", &tree.base_root())
            .await
            .unwrap()
            .node;
        tree.retain(root.root_id()).await.unwrap();
        tree.close_filesystem(root.root_id()).await.unwrap();
        assert_eq!(tree.root_kind(root.root_id()).await, Some(RootKind::Scheme));

        tree.retain(tree.base_root().root_id()).await.unwrap();
        assert_eq!(tree.holds(tree.base_root().root_id()).await, Some(0));
    }

    #[tokio::test]
    async fn file_scheme_maps_host_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.txt"), "hi").unwrap();

        let tree = tree();
        let locator = format!("file://{}/hello.txt", temp.path().display());
        let node = tree
            .resolve_creating(&locator, &tree.base_root())
            .await
            .unwrap()
            .node;
        assert_eq!(&tree.read(&node).await.unwrap()[..], b"hi");
    }
}
