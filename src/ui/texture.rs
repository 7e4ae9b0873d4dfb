//! egui-backed texture cache.

use eframe::egui::{self, ColorImage, TextureHandle, TextureId, TextureOptions};

use crate::frame::VideoFrame;
use crate::scene::TextureCache;

/// Number of textures cycled through. The one on screen is never the one
/// being rewritten.
const SLOTS: usize = 2;

/// Uploads frames into a small ring of egui textures, rewriting each slot in
/// place with [`TextureHandle::set`] instead of allocating per frame
pub struct EguiTextureCache {
    ctx: egui::Context,
    slots: Vec<TextureHandle>,
    next: usize,
}

impl EguiTextureCache {
    pub fn new(ctx: egui::Context) -> Self {
        Self {
            ctx,
            slots: Vec::with_capacity(SLOTS),
            next: 0,
        }
    }
}

impl TextureCache for EguiTextureCache {
    type Texture = TextureId;

    fn create_texture(&mut self, frame: &VideoFrame) -> Option<TextureId> {
        if frame.is_empty() {
            return None;
        }

        let size = [frame.width() as usize, frame.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, &frame.to_rgba8());

        let slot = self.next;
        self.next = (self.next + 1) % SLOTS;

        if let Some(handle) = self.slots.get_mut(slot) {
            handle.set(image, TextureOptions::LINEAR);
            return Some(handle.id());
        }

        let handle = self
            .ctx
            .load_texture(format!("video-{slot}"), image, TextureOptions::LINEAR);
        let id = handle.id();
        self.slots.push(handle);
        Some(id)
    }
}
