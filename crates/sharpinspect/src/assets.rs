//! Embedded static asset bundle for the DevTools web UI (spec §4.10 `GET /*`).
//!
//! The UI itself is out of scope for this spec; `assets/` holds a minimal
//! placeholder `index.html` so the route contract (serve `index.html` at
//! `/`, 404 if a path has no match) is real and testable.

use axum_embed::ServeEmbed;
use rust_embed::RustEmbed;

#[derive(RustEmbed, Clone)]
#[folder = "assets/"]
pub(crate) struct Assets;

pub fn service() -> ServeEmbed<Assets> {
    ServeEmbed::<Assets>::new()
}
