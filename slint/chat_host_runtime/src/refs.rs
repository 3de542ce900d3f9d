use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Live handle to an on-screen input whose value is read outside normal data
/// binding.
pub trait ElementHandle {
    /// Current value, or `None` when the element is not attached.
    fn value(&self) -> Option<String>;
}

impl<F> ElementHandle for F
where
    F: Fn() -> Option<String>,
{
    fn value(&self) -> Option<String> {
        self()
    }
}

/// Named handles to live elements, shared by the bindings of one window.
///
/// Clones share the same table; [`RefScope::new`] starts an unrelated one.
/// Registration is last-writer-wins per key.
#[derive(Clone, Default)]
pub struct RefScope {
    handles: Rc<RefCell<HashMap<String, Rc<dyn ElementHandle>>>>,
}

impl RefScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: impl Into<String>, handle: Rc<dyn ElementHandle>) {
        self.handles.borrow_mut().insert(key.into(), handle);
    }

    pub fn resolve(&self, key: &str) -> Option<String> {
        let handle = self.handles.borrow().get(key).cloned()?;
        handle.value()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.borrow().contains_key(key)
    }
}

impl std::fmt::Debug for RefScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handles = self.handles.borrow();
        let mut keys: Vec<&String> = handles.keys().collect();
        keys.sort();
        f.debug_struct("RefScope").field("keys", &keys).finish()
    }
}
