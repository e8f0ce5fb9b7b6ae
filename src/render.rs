//! View rendering seam. Extension views hand a template reference and their
//! binding map to a [`Renderer`]; template engines live behind this trait.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

pub type Bindings = Map<String, Value>;

pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, bindings: &Bindings) -> anyhow::Result<Response>;
}

/// Renders a view as `{"template": ..., "bind": {...}}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, template: &str, bindings: &Bindings) -> anyhow::Result<Response> {
        if template.trim().is_empty() {
            anyhow::bail!("view has no template");
        }
        Ok(Json(json!({ "template": template, "bind": bindings })).into_response())
    }
}
