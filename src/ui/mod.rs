//! Native egui UI for irisview.
//!
//! Provides a desktop window with:
//! - The processed camera video, aspect-fitted as the background
//! - The tracked box, textured with the same video
//! - A statistics panel with pipeline counters and the current pose
//!
//! Enabled via `--features native-ui`.

mod app;
mod texture;

pub use app::IrisviewApp;
pub use texture::EguiTextureCache;
