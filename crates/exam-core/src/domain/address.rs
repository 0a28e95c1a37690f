//! TestAddress - invoke 可能な test target の ID
//!
//! 等価性・hash は `AddressId` によるもので、caption や arguments は見ない。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::ids::AddressId;

/// Stable identity of one invocable unit of test logic.
///
/// Equality and hashing are identity based: two addresses are equal iff they
/// were minted by the same `new`/`decorate` call (or are clones of it). Two
/// addresses with identical captions and arguments are still different targets.
///
/// A decorated address keeps a link to its root, the un-decorated original.
/// The root of a root address is the address itself.
#[derive(Clone)]
pub struct TestAddress(Arc<AddressInner>);

struct AddressInner {
    id: AddressId,
    root: Option<TestAddress>,
    caption: String,
    arguments: Vec<serde_json::Value>,
}

impl TestAddress {
    /// New root address without arguments.
    pub fn new(caption: impl Into<String>) -> Self {
        Self::with_arguments(caption, Vec::new())
    }

    /// New root address carrying its own arguments.
    pub fn with_arguments(caption: impl Into<String>, arguments: Vec<serde_json::Value>) -> Self {
        Self(Arc::new(AddressInner {
            id: AddressId::generate(),
            root: None,
            caption: caption.into(),
            arguments,
        }))
    }

    /// Derive a new address from this one.
    ///
    /// The caption becomes `<caption>[<label>]`, `arguments` are appended to the
    /// parent's, and the root is carried over unchanged.
    pub fn decorate(&self, label: &str, arguments: Vec<serde_json::Value>) -> Self {
        let mut all = self.0.arguments.clone();
        all.extend(arguments);
        Self(Arc::new(AddressInner {
            id: AddressId::generate(),
            root: Some(self.root()),
            caption: format!("{}[{}]", self.0.caption, label),
            arguments: all,
        }))
    }

    pub fn id(&self) -> AddressId {
        self.0.id
    }

    pub fn root(&self) -> TestAddress {
        match &self.0.root {
            Some(root) => root.clone(),
            None => self.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.0.root.is_none()
    }

    pub fn caption(&self) -> &str {
        &self.0.caption
    }

    pub fn arguments(&self) -> &[serde_json::Value] {
        &self.0.arguments
    }
}

impl PartialEq for TestAddress {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for TestAddress {}

impl Hash for TestAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for TestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestAddress")
            .field("id", &self.0.id)
            .field("caption", &self.0.caption)
            .field("arguments", &self.0.arguments)
            .field("root", &self.0.root.as_ref().map(|r| r.id()))
            .finish()
    }
}

impl fmt::Display for TestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.caption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn equality_is_identity_not_structure() {
        let a = TestAddress::new("probe.test");
        let b = TestAddress::new("probe.test");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let set: HashSet<_> = [a.clone(), b, a].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn root_of_root_is_itself() {
        let a = TestAddress::new("x");
        assert!(a.is_root());
        assert_eq!(a.root(), a);
    }

    #[test]
    fn decoration_keeps_top_most_root() {
        let root = TestAddress::with_arguments("calc.add", vec![json!(1)]);
        let once = root.decorate("native", vec![json!("native")]);
        let twice = once.decorate("retry", vec![]);

        assert!(!once.is_root());
        assert_eq!(once.root(), root);
        assert_eq!(twice.root(), root);
        assert_ne!(once, root);

        assert_eq!(once.caption(), "calc.add[native]");
        assert_eq!(twice.caption(), "calc.add[native][retry]");
        assert_eq!(once.arguments(), &[json!(1), json!("native")]);
    }
}
