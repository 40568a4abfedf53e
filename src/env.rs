//! Binding environment for `Ref` resolution.
//!
//! An `Env` is a chain of borrowed scopes living on the checker's call stack.
//! Extending it never touches the parent, so a `Let` cannot leak bindings to
//! sibling subtrees once its check returns.
use crate::types::{Bindings, Type};

#[derive(Debug, Clone, Copy, Default)]
pub struct Env<'e, 't> {
    scope: Option<&'t Bindings>,
    parent: Option<&'e Env<'e, 't>>,
}

impl<'e, 't> Env<'e, 't> {
    pub const fn empty() -> Self {
        Self { scope: None, parent: None }
    }

    pub const fn root(bindings: &'t Bindings) -> Self {
        Self { scope: Some(bindings), parent: None }
    }

    /// A child environment where `bindings` win over anything visible here.
    pub fn extend<'s>(&'s self, bindings: &'t Bindings) -> Env<'s, 't> {
        Env { scope: Some(bindings), parent: Some(self) }
    }

    pub fn lookup(&self, name: &str) -> Option<&'t Type> {
        let mut cursor = Some(self);
        while let Some(env) = cursor {
            if let Some(t) = env.scope.and_then(|scope| scope.get(name)) {
                return Some(t);
            }
            cursor = env.parent;
        }
        None
    }

    /// Flattened copy of every visible binding (outermost first, shadowed
    /// entries replaced in place).
    pub fn snapshot(&self) -> Bindings {
        let mut scopes = Vec::new();
        let mut cursor = Some(self);
        while let Some(env) = cursor {
            scopes.extend(env.scope);
            cursor = env.parent;
        }
        let mut out = Bindings::new();
        for scope in scopes.into_iter().rev() {
            for (name, t) in scope {
                out.insert(name.clone(), t.clone());
            }
        }
        out
    }
}

// ------------------------------- Tests ------------------------------------ //
