//! The stack of filesystems a session has opened.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use vsh_core::Node;

use crate::engine::Engine;
use crate::error::{VshError, VshResult};

/// One entry of the mount stack. A fallback entry records where the session
/// stood before its first open; it is never released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    node: Node,
    fallback: bool,
}

impl MountEntry {
    #[must_use]
    pub const fn root(node: Node) -> Self {
        Self {
            node,
            fallback: false,
        }
    }

    #[must_use]
    pub const fn fallback(node: Node) -> Self {
        Self {
            node,
            fallback: true,
        }
    }

    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}

impl fmt::Display for MountEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fallback {
            write!(f, "{} (fallback)", self.node)
        } else {
            write!(f, "{}", self.node)
        }
    }
}

/// Oldest entry first.
#[derive(Debug, Clone, Default)]
pub struct MountStack {
    entries: Vec<MountEntry>,
}

impl MountStack {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&MountEntry> {
        self.entries.get(index)
    }

    /// Pushes `entry` unless it is already on the stack.
    pub fn push(&mut self, entry: MountEntry) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Index of the newest entry containing `node`.
    #[must_use]
    pub fn topmost_containing(&self, node: &Node) -> Option<usize> {
        self.entries.iter().rposition(|e| e.node.contains(node))
    }

    pub fn remove(&mut self, index: usize) -> Option<MountEntry> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    #[must_use]
    pub fn fallback(&self) -> Option<&Node> {
        self.entries.iter().find(|e| e.fallback).map(|e| &e.node)
    }

    fn take(&mut self) -> Vec<MountEntry> {
        std::mem::take(&mut self.entries)
    }

    /// One line per entry, numbered from 1.
    #[must_use]
    pub fn listing(&self) -> Vec<String> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("{}  {e}", i + 1))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Files are layered, folders are entered in their own root.
    #[default]
    Auto,
    Layered,
    Virtual,
}

impl Engine {
    /// Opens `locator` and moves into it. Returns the root that was pushed.
    ///
    /// Each entry on the stack owns one hold on its root, so roots another
    /// session also opened stay alive until both have closed them.
    pub async fn open(&mut self, locator: &str, mode: OpenMode) -> VshResult<Node> {
        let target = self.resolve(locator).await?;
        let info = self
            .tree()
            .stat(&target)
            .await
            .map_err(|_| VshError::command(format!("{locator}: no such file or folder")))?;

        let tree = Arc::clone(self.tree());
        let (root, cwd, acquired) = match (mode, info.is_dir()) {
            (OpenMode::Auto | OpenMode::Layered, false) => {
                let root = tree.open_layered(&target).await?;
                (root.clone(), root, true)
            }
            (OpenMode::Virtual, true) => {
                let root = tree.open_virtual(&target).await?;
                (root.clone(), root, true)
            }
            (OpenMode::Auto, true) => (target.root(), target, false),
            (OpenMode::Layered, true) => {
                return Err(VshError::command(format!(
                    "{locator}: is a folder, only files can be layered"
                )))
            }
            (OpenMode::Virtual, false) => {
                return Err(VshError::command(format!("{locator}: not a folder")))
            }
        };

        let entry = MountEntry::root(root.clone());
        let on_stack = self.context().mounts().entries().contains(&entry);
        match (on_stack, acquired) {
            (true, true) => tree.close_filesystem(root.root_id()).await?,
            (false, false) if root.root_id() != tree.base_root().root_id() => {
                if !self.context_mut().unhold(&root) {
                    tree.retain(root.root_id()).await?;
                }
            }
            _ => {}
        }

        let parent_layer = tree.parent_layer(root.root_id()).await;
        let previous = self.context().cwd().clone();
        let mounts = self.context_mut().mounts_mut();
        if mounts.is_empty() && parent_layer.is_none() {
            mounts.push(MountEntry::fallback(previous));
        }
        mounts.push(entry);
        self.context_mut().set_cwd(cwd);

        debug!(root = %root, "opened filesystem");
        Ok(root)
    }

    /// Closes one mount entry, chosen by 1-based index, by locator, or by
    /// the working location when `selector` is `None`. The session moves to
    /// the layer the entry was opened from, else the entry below it, else
    /// the base root.
    pub async fn close(&mut self, selector: Option<&str>) -> VshResult<MountEntry> {
        let index = self.select_mount(selector).await?;
        let Some(entry) = self.context().mounts().get(index).cloned() else {
            return Err(VshError::command("no such filesystem"));
        };

        let tree = Arc::clone(self.tree());
        let base = tree.base_root();
        let parent_layer = if entry.is_fallback() {
            None
        } else {
            tree.parent_layer(entry.node().root_id()).await
        };
        let next = match parent_layer {
            Some(layer) => self.promote_to_folder(layer).await,
            None => index
                .checked_sub(1)
                .and_then(|below| self.context().mounts().get(below))
                .map_or_else(|| base.clone(), |e| e.node().clone()),
        };

        if !entry.is_fallback() && entry.node().root_id() != base.root_id() {
            tree.close_filesystem(entry.node().root_id()).await?;
        }
        self.context_mut().mounts_mut().remove(index);
        self.context_mut().set_cwd(next);

        debug!(entry = %entry, "closed filesystem");
        Ok(entry)
    }

    async fn select_mount(&mut self, selector: Option<&str>) -> VshResult<usize> {
        let count = self.context().mounts().len();
        if count == 0 {
            return Err(VshError::command("no open filesystems"));
        }

        let node = match selector {
            Some(index) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
                return match index.parse::<usize>() {
                    Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
                    _ => Err(VshError::command(format!(
                        "{index}: index out of range 1..{count}"
                    ))),
                };
            }
            Some(locator) => self.resolve(locator).await?,
            None => self.context().cwd().clone(),
        };

        self.context()
            .mounts()
            .topmost_containing(&node)
            .ok_or_else(|| VshError::command(format!("{node}: not inside an open filesystem")))
    }

    /// Releases every entry, newest first, then the scheme roots the session
    /// created while resolving. Returns the roots whose holds were released.
    /// The session moves to the fallback, else the base root.
    pub async fn close_all(&mut self) -> Vec<Node> {
        let entries = self.context_mut().mounts_mut().take();
        let held = self.context_mut().take_held();
        let tree = Arc::clone(self.tree());
        let base = tree.base_root();

        let roots = entries
            .iter()
            .rev()
            .filter(|e| !e.is_fallback() && e.node().root_id() != base.root_id())
            .map(MountEntry::node)
            .chain(held.iter());

        let mut released = Vec::new();
        for root in roots {
            match tree.close_filesystem(root.root_id()).await {
                Ok(()) => released.push(root.clone()),
                Err(e) => warn!(root = %root, error = %e, "failed to release filesystem"),
            }
        }

        let fallback = entries
            .iter()
            .find(|e| e.is_fallback())
            .map(|e| e.node().clone());
        self.context_mut().set_cwd(fallback.unwrap_or(base));
        released
    }
}
