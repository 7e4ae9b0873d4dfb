//! Main egui application: video background with the tracked box on top.

use std::sync::Arc;
use std::time::Instant;

use eframe::egui::{self, epaint::Vertex, Color32, Mesh, Pos2, Rect, Shape, TextureId};
use glam::{Mat4, Vec2};

use crate::config::SceneConfig;
use crate::geometry::Resolution;
use crate::scene::{cube, Scene, SceneActor};
use crate::tracking::EventReceiver;
use crate::AppState;

use super::texture::EguiTextureCache;

/// Box color used until the first processed frame arrives
const UNTEXTURED_BOX: Color32 = Color32::from_rgb(90, 160, 255);

/// The native egui application window.
pub struct IrisviewApp {
    state: Arc<AppState>,
    actor: SceneActor<EguiTextureCache>,
    show_statistics: bool,
    last_frame: Instant,
    /// Smoothed frames per second of the UI itself
    fps: f32,
}

impl IrisviewApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        state: Arc<AppState>,
        events: EventReceiver,
        scene_config: &SceneConfig,
        background_transform: Mat4,
    ) -> Self {
        let cache = EguiTextureCache::new(cc.egui_ctx.clone());
        let actor = SceneActor::new(
            scene_config,
            background_transform,
            cache,
            events,
            Arc::clone(&state),
        );

        Self {
            state,
            actor,
            show_statistics: scene_config.show_statistics,
            last_frame: Instant::now(),
            fps: 0.0,
        }
    }

    /// Launch the native UI window. Blocks until the window is closed.
    pub fn run(
        state: Arc<AppState>,
        events: EventReceiver,
        scene_config: SceneConfig,
        background_transform: Mat4,
        window_size: [f32; 2],
    ) -> eframe::Result {
        let options = eframe::NativeOptions {
            viewport: egui::ViewportBuilder::default()
                .with_title("irisview")
                .with_inner_size(window_size),
            ..Default::default()
        };

        eframe::run_native(
            "irisview",
            options,
            Box::new(move |cc| {
                Ok(Box::new(Self::new(
                    cc,
                    state,
                    events,
                    &scene_config,
                    background_transform,
                )))
            }),
        )
    }

    fn update_fps(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        if dt > 0.0 {
            let instant = 1.0 / dt;
            self.fps = if self.fps == 0.0 {
                instant
            } else {
                self.fps * 0.9 + instant * 0.1
            };
        }
    }

    fn statistics_panel(&self, ui: &mut egui::Ui) {
        let stats = self.state.stats.snapshot();
        let scene = self.actor.scene();

        ui.heading("Statistics");
        ui.separator();
        ui.label(format!("UI: {:.0} fps", self.fps));
        ui.label(format!("Captured: {}", stats.frames_captured));
        ui.label(format!("Late, dropped: {}", stats.frames_discarded_late));
        ui.label(format!("No image: {}", stats.frames_missing_image));
        ui.label(format!("Delivered: {}", stats.frames_delivered));
        ui.separator();
        ui.label(format!("Poses: {}", stats.poses_applied));
        ui.label(format!("Textures: {}", stats.textures_applied));
        if stats.textures_failed > 0 {
            ui.colored_label(
                Color32::YELLOW,
                format!("Texture failures: {}", stats.textures_failed),
            );
        }
        ui.separator();

        let pos = scene.target.position();
        let rot = scene.target.euler_angles();
        ui.label(format!("Pos: [{:.1}, {:.1}, {:.1}]", pos.x, pos.y, pos.z));
        ui.label(format!(
            "Rot: [{:.1}, {:.1}, {:.1}]",
            rot.x.to_degrees(),
            rot.y.to_degrees(),
            rot.z.to_degrees(),
        ));
    }
}

fn to_pos(rect: Rect, p: Vec2) -> Pos2 {
    rect.min + egui::vec2(p.x, p.y)
}

fn paint_background(painter: &egui::Painter, rect: Rect, scene: &Scene<TextureId>) {
    let Some(texture) = scene.background.contents else {
        return;
    };

    let (origin, size) = scene
        .background
        .display_rect(Resolution::new(rect.width(), rect.height()));
    let target = Rect::from_min_size(to_pos(rect, origin), egui::vec2(size.x, size.y));
    let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
    painter.image(texture, target, uv, Color32::WHITE);
}

fn paint_box(painter: &egui::Painter, rect: Rect, scene: &Scene<TextureId>) {
    let aspect = rect.width() / rect.height();
    let view_proj = scene.camera.projection(aspect);
    let viewport = Vec2::new(rect.width(), rect.height());
    let faces = cube::project_box(scene.target.transform, scene.target.size, view_proj, viewport);

    for face in faces {
        let mut mesh = match scene.target.surface {
            Some(texture) => Mesh::with_texture(texture),
            None => Mesh::default(),
        };

        for (corner, uv) in face.corners.iter().zip(face.uvs.iter()) {
            let pos = to_pos(rect, *corner);
            if scene.target.surface.is_some() {
                mesh.vertices.push(Vertex {
                    pos,
                    uv: Pos2::new(uv.x, uv.y),
                    color: Color32::WHITE,
                });
            } else {
                mesh.colored_vertex(pos, UNTEXTURED_BOX);
            }
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(0, 2, 3);
        painter.add(Shape::mesh(mesh));
    }
}

impl eframe::App for IrisviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply everything the tracker produced since the last repaint
        self.actor.drain();
        self.update_fps();

        if self.show_statistics {
            egui::SidePanel::left("statistics").show(ctx, |ui| {
                self.statistics_panel(ui);
            });
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let available_size = ui.available_size();
                let (rect, _response) =
                    ui.allocate_exact_size(available_size, egui::Sense::hover());
                if rect.width() <= 0.0 || rect.height() <= 0.0 {
                    return;
                }

                let painter = ui.painter_at(rect);
                let scene = self.actor.scene();
                paint_background(&painter, rect, scene);
                paint_box(&painter, rect, scene);
            });

        // Repaint continuously for real-time updates
        ctx.request_repaint();
    }
}
