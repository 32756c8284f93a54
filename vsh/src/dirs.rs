//! The directory stack behind `pushd`, `popd`, `peekd` and `dirs`.

use vsh_core::Node;

use crate::engine::Engine;
use crate::error::VshResult;

pub const DEFAULT_DIR_STACK_LIMIT: usize = 99;

#[derive(Debug, Clone)]
pub struct DirStack {
    entries: Vec<Node>,
    limit: usize,
}

impl Default for DirStack {
    fn default() -> Self {
        Self::with_limit(DEFAULT_DIR_STACK_LIMIT)
    }
}

impl DirStack {
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit,
        }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Changes the cap. Entries already above it are kept.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Pushes `node` unless it already is the top entry or the stack is full.
    /// Returns whether the stack grew.
    pub fn push(&mut self, node: Node) -> bool {
        if self.entries.len() >= self.limit || self.entries.last() == Some(&node) {
            return false;
        }
        self.entries.push(node);
        true
    }

    pub fn pop(&mut self) -> Option<Node> {
        self.entries.pop()
    }

    #[must_use]
    pub fn peek(&self) -> Option<&Node> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter().rev()
    }
}

impl Engine {
    /// Saves the working location and moves to `locator`. Without a locator
    /// the working location is only saved.
    pub async fn pushd(&mut self, locator: Option<&str>) -> VshResult<()> {
        let target = match locator {
            Some(locator) => Some(self.resolve_folder(locator).await?),
            None => None,
        };
        let cwd = self.context().cwd().clone();
        self.context_mut().dirs_mut().push(cwd);
        if let Some(target) = target {
            self.context_mut().set_cwd(target);
        }
        Ok(())
    }

    /// Pops the newest saved location and moves there unless `stay` is set.
    pub fn popd(&mut self, stay: bool) -> Option<Node> {
        let node = self.context_mut().dirs_mut().pop()?;
        if !stay {
            self.context_mut().set_cwd(node.clone());
        }
        Some(node)
    }

    /// Moves to the newest saved location without popping it.
    pub fn peekd(&mut self) -> Option<Node> {
        let node = self.context().dirs().peek()?.clone();
        self.context_mut().set_cwd(node.clone());
        Some(node)
    }

    /// Listing of the working location (index 0) and the stack, newest first.
    #[must_use]
    pub fn dir_listing(&self) -> Vec<String> {
        std::iter::once(self.context().cwd())
            .chain(self.context().dirs().iter())
            .enumerate()
            .map(|(i, node)| format!("{i}  {node}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vsh_core::{MemoryFs, ResourceTree};

    fn base() -> Node {
        ResourceTree::new(Arc::new(MemoryFs::new())).base_root()
    }

    #[test]
    fn repeated_push_is_a_no_op() {
        let x = base().join("x");
        let mut stack = DirStack::default();
        assert!(stack.push(x.clone()));
        assert!(!stack.push(x.clone()));
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.pop(), Some(x));
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_on_empty_stack() {
        let mut stack = DirStack::default();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.peek(), None);
    }

    #[test]
    fn cap_is_enforced() {
        let root = base();
        let mut stack = DirStack::with_limit(2);
        assert!(stack.push(root.join("a")));
        assert!(stack.push(root.join("b")));
        assert!(!stack.push(root.join("c")));
        let paths: Vec<&str> = stack.iter().map(Node::path).collect();
        assert_eq!(paths, ["/b", "/a"]);
    }

    fn engine() -> Engine {
        let fs = MemoryFs::new();
        fs.insert_dir("/a").unwrap();
        fs.insert_dir("/b").unwrap();
        fs.insert_file("/file", "x").unwrap();
        Engine::new(Arc::new(ResourceTree::new(Arc::new(fs))))
    }

    #[tokio::test]
    async fn pushd_popd_round_trip() {
        let mut engine = engine();
        engine.pushd(Some("/a")).await.unwrap();
        engine.pushd(Some("/b")).await.unwrap();
        assert_eq!(engine.context().cwd().path(), "/b");
        assert_eq!(engine.dir_listing(), ["0  /b", "1  /a", "2  /"]);

        assert_eq!(engine.popd(false).map(|n| n.path().to_string()), Some("/a".into()));
        assert_eq!(engine.context().cwd().path(), "/a");
        assert_eq!(engine.popd(true).map(|n| n.path().to_string()), Some("/".into()));
        assert_eq!(engine.context().cwd().path(), "/a");
        assert!(engine.popd(false).is_none());
    }

    #[tokio::test]
    async fn pushd_rejects_files_and_missing_targets() {
        let mut engine = engine();
        assert!(engine.pushd(Some("/file")).await.is_err());
        assert!(engine.pushd(Some("/nowhere")).await.is_err());
        assert!(engine.context().dirs().is_empty());
        assert_eq!(engine.context().cwd().path(), "/");
    }

    #[tokio::test]
    async fn peekd_keeps_the_entry() {
        let mut engine = engine();
        engine.pushd(Some("/a")).await.unwrap();
        engine.pushd(None).await.unwrap();
        let b = engine.tree().base_root().join("b");
        engine.context_mut().set_cwd(b);
        assert_eq!(engine.peekd().map(|n| n.path().to_string()), Some("/a".into()));
        assert_eq!(engine.context().cwd().path(), "/a");
        assert_eq!(engine.context().dirs().len(), 2);
    }
}
