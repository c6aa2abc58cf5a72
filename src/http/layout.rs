//! Named layouts with parent inheritance.
//!
//! # Composition
//! ```text
//! resolve("dashboard") = [dashboard, root]      (leaf first)
//! compose(content)     = root(dashboard(content))
//! ```
//!
//! # Design Decisions
//! - Parent links are checked at registration; a link that would close a
//!   cycle is rejected instead of silently truncating the chain later
//! - A parent may be registered after its child; a dangling parent is
//!   reported when the chain is resolved

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::http::context::RequestContext;
use crate::http::render::{BoxRenderable, Renderable};

pub type LayoutFn = Arc<dyn Fn(&RequestContext, BoxRenderable) -> BoxRenderable + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("layout `{0}` is not registered")]
    UnknownLayout(String),

    #[error("layout `{layout}` names parent `{parent}`, which is not registered")]
    MissingParent { layout: String, parent: String },

    #[error("layout parents form a cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// A registered layout.
#[derive(Clone)]
pub struct Layout {
    name: String,
    parent: Option<String>,
    render: LayoutFn,
}

impl Layout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn apply(&self, ctx: &RequestContext, content: BoxRenderable) -> BoxRenderable {
        (self.render)(ctx, content)
    }
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Default)]
pub struct LayoutRegistry {
    layouts: RwLock<HashMap<String, Layout>>,
}

impl LayoutRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a layout.
    pub fn register<F, R>(
        &self,
        name: &str,
        parent: Option<&str>,
        render: F,
    ) -> Result<(), LayoutError>
    where
        F: Fn(&RequestContext, BoxRenderable) -> R + Send + Sync + 'static,
        R: Renderable + 'static,
    {
        let mut layouts = self.layouts.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(parent) = parent {
            let mut chain = vec![name.to_string()];
            let mut current = Some(parent.to_string());
            while let Some(link) = current {
                chain.push(link.clone());
                if link == name {
                    return Err(LayoutError::Cycle(chain));
                }
                current = layouts.get(&link).and_then(|l| l.parent.clone());
            }
        }

        tracing::debug!(layout = name, parent = ?parent, "Layout registered");
        layouts.insert(
            name.to_string(),
            Layout {
                name: name.to_string(),
                parent: parent.map(str::to_string),
                render: Arc::new(move |ctx: &RequestContext, content: BoxRenderable| {
                    Box::new(render(ctx, content)) as BoxRenderable
                }),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.layouts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// The chain for `name`, leaf first and root last.
    pub fn resolve(&self, name: &str) -> Result<Vec<Layout>, LayoutError> {
        let layouts = self.layouts.read().unwrap_or_else(PoisonError::into_inner);

        let mut layout = layouts
            .get(name)
            .ok_or_else(|| LayoutError::UnknownLayout(name.to_string()))?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(layout.name.as_str()) {
                let mut names: Vec<String> =
                    chain.iter().map(|l: &Layout| l.name.clone()).collect();
                names.push(layout.name.clone());
                return Err(LayoutError::Cycle(names));
            }
            chain.push(layout.clone());

            let Some(parent) = layout.parent.as_deref() else {
                break;
            };
            layout = layouts.get(parent).ok_or_else(|| LayoutError::MissingParent {
                layout: layout.name.clone(),
                parent: parent.to_string(),
            })?;
        }

        Ok(chain)
    }
}

/// Wrap `content` in a resolved chain: the leaf wraps first, the root last.
pub fn compose(chain: &[Layout], ctx: &RequestContext, content: BoxRenderable) -> BoxRenderable {
    chain
        .iter()
        .fold(content, |inner, layout| layout.apply(ctx, inner))
}
