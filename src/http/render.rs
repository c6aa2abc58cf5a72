//! The opaque output of handlers and layouts.
//!
//! The dispatcher never inspects what a handler produced; it only asks the
//! value to write itself into the response buffer.

use std::borrow::Cow;
use std::io::{self, Write};
use std::sync::Arc;

use serde::Serialize;

/// Something that can write itself to an output stream.
pub trait Renderable: Send + Sync {
    fn render(&self, out: &mut dyn Write) -> io::Result<()>;
}

pub type BoxRenderable = Box<dyn Renderable>;

impl Renderable for String {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.as_bytes())
    }
}

impl Renderable for &'static str {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.as_bytes())
    }
}

impl Renderable for Cow<'static, str> {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self.as_bytes())
    }
}

impl Renderable for Vec<u8> {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(self)
    }
}

impl<T: Renderable + ?Sized> Renderable for Box<T> {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        (**self).render(out)
    }
}

impl<T: Renderable + ?Sized> Renderable for Arc<T> {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        (**self).render(out)
    }
}

/// Renderable backed by a closure. Layouts use this to wrap their content.
pub struct RenderFn<F>(F);

pub fn render_fn<F>(f: F) -> RenderFn<F>
where
    F: Fn(&mut dyn Write) -> io::Result<()> + Send + Sync,
{
    RenderFn(f)
}

impl<F> Renderable for RenderFn<F>
where
    F: Fn(&mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        (self.0)(out)
    }
}

/// Serializes the wrapped value as JSON. The caller owns the content type.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize + Send + Sync> Renderable for Json<T> {
    fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(out, &self.0).map_err(io::Error::from)
    }
}

/// Render into a fresh byte buffer.
pub fn render_to_vec(value: &dyn Renderable) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    value.render(&mut buffer)?;
    Ok(buffer)
}
