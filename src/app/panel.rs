use crate::hud::HudModel;
use crate::quality::{QualityTier, ShadowMode};

pub struct PanelView<'a> {
    pub hud: &'a HudModel,
    pub tier: QualityTier,
    pub shadow_mode: ShadowMode,
    pub simplified: bool,
    pub antialiasing: bool,
    pub grid_visible: bool,
    pub paths_visible: bool,
    pub follow_robot: bool,
    pub entity_count: usize,
    pub fps: f32,
}

/// Mutations requested by the panel this frame; applied by the app after the
/// egui pass so every side effect goes through the usual narrow setters.
#[derive(Default)]
pub struct PanelRequests {
    pub tier: Option<QualityTier>,
    pub shadow_mode: Option<ShadowMode>,
    pub simplified: Option<bool>,
    pub grid: Option<bool>,
    pub paths: Option<bool>,
    pub follow: Option<bool>,
    pub reset_camera: bool,
    pub top_view: bool,
    pub start_simulation: bool,
    pub stop_simulation: bool,
}

pub fn draw(ctx: &egui::Context, view: &PanelView<'_>) -> PanelRequests {
    let mut requests = PanelRequests::default();
    egui::SidePanel::left("wareview_panel").default_width(250.0).show(ctx, |ui| {
        ui.heading("Simulation");
        ui.label(format!("Link: {}", view.hud.connection.label()));
        if let Some(note) = &view.hud.transport_note {
            ui.colored_label(egui::Color32::YELLOW, note);
        }
        ui.horizontal(|ui| {
            if ui.button("Start").clicked() {
                requests.start_simulation = true;
            }
            if ui.button("Stop").clicked() {
                requests.stop_simulation = true;
            }
        });

        ui.separator();
        ui.heading("Robot");
        ui.label(format!("Status: {}", view.hud.status.label()));
        match view.hud.battery_fraction() {
            Some(fraction) => {
                ui.add(egui::ProgressBar::new(fraction).text(format!(
                    "battery {:.0}%",
                    view.hud.battery_percentage.unwrap_or(0.0)
                )));
            }
            None => {
                ui.label("battery unknown");
            }
        }
        ui.label(format!(
            "Tasks: {} pending / {} done",
            view.hud.tasks_pending, view.hud.tasks_completed
        ));

        ui.separator();
        ui.heading("Quality");
        ui.horizontal(|ui| {
            for tier in [QualityTier::Low, QualityTier::Balanced, QualityTier::High] {
                if ui.selectable_label(view.tier == tier, tier.label()).clicked() {
                    requests.tier = Some(tier);
                }
            }
        });
        ui.horizontal(|ui| {
            ui.label("Shadows:");
            for mode in [ShadowMode::Off, ShadowMode::Low, ShadowMode::High] {
                if ui.selectable_label(view.shadow_mode == mode, mode.label()).clicked() {
                    requests.shadow_mode = Some(mode);
                }
            }
        });
        let mut simplified = view.simplified;
        if ui.checkbox(&mut simplified, "Simplified view").changed() {
            requests.simplified = Some(simplified);
        }
        ui.small(format!(
            "Antialiasing {} (startup setting; change in config/app.json)",
            if view.antialiasing { "on" } else { "off" }
        ));

        ui.separator();
        ui.heading("View");
        let mut grid = view.grid_visible;
        if ui.checkbox(&mut grid, "Grid (g)").changed() {
            requests.grid = Some(grid);
        }
        let mut paths = view.paths_visible;
        if ui.checkbox(&mut paths, "Paths (p)").changed() {
            requests.paths = Some(paths);
        }
        let mut follow = view.follow_robot;
        if ui.checkbox(&mut follow, "Follow robot (f)").changed() {
            requests.follow = Some(follow);
        }
        ui.horizontal(|ui| {
            if ui.button("Reset camera (r)").clicked() {
                requests.reset_camera = true;
            }
            if ui.button("Top view (t)").clicked() {
                requests.top_view = true;
            }
        });

        ui.separator();
        ui.small(format!("{} entities — {:.0} fps", view.entity_count, view.fps));
    });
    requests
}
