use eframe::egui;
use eframe::egui::Visuals;
use stagelens::config::Config;
use stagelens::logging;
use stagelens::models::{AppState, Tab};
use stagelens::ui;
use std::error::Error;

pub struct StageLensApp {
    state: AppState,
}

impl StageLensApp {
    fn new(config: Config) -> Self {
        Self {
            state: AppState::new(config),
        }
    }
}

fn check_debug_output(state: &mut AppState) {
    let fresh = logging::drain_debug_output();
    if !fresh.is_empty() {
        state.debug_output.push_str(&fresh);
    }
}

impl eframe::App for StageLensApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.set_visuals(Visuals::dark());

        check_debug_output(&mut self.state);

        egui::SidePanel::left("data_panel").show(ctx, |ui| {
            ui.set_width(220.0);
            ui.heading("StageLens");
            ui.separator();
            ui::side_panel(ui, &mut self.state);
        });

        egui::TopBottomPanel::bottom("debug_panel")
            .resizable(true)
            .min_height(50.0)
            .default_height(self.state.debug_panel_height)
            .show_animated(ctx, self.state.debug_panel_visible, |ui| {
                self.state.debug_panel_height = ui.available_height();

                ui.horizontal(|ui| {
                    ui.heading("Debug Output");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("Clear").clicked() {
                            self.state.debug_output.clear();
                        }
                        if ui.button("Hide").clicked() {
                            self.state.debug_panel_visible = false;
                        }
                    });
                });
                ui.separator();

                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        ui.add(
                            egui::TextEdit::multiline(&mut self.state.debug_output)
                                .desired_width(f32::INFINITY)
                                .desired_rows(10)
                                .font(egui::TextStyle::Monospace)
                                .code_editor()
                                .lock_focus(false)
                                .interactive(false),
                        );
                    });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui::tab_bar(ui, &mut self.state);
            ui.separator();

            match self.state.selected_tab {
                Tab::Query => ui::query_tab(ctx, ui, &mut self.state),
                Tab::Charts => ui::charts_tab(ui, &mut self.state),
                Tab::Predict => ui::predict_tab(ui, &mut self.state),
                Tab::Summary => ui::summary_tab(ui, &mut self.state),
            }

            if !self.state.debug_panel_visible {
                ui.with_layout(egui::Layout::bottom_up(egui::Align::Center), |ui| {
                    if ui.button("Show Debug Panel").clicked() {
                        self.state.debug_panel_visible = true;
                    }
                });
            }
        });
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let (config, issues) = Config::from_env();
    logging::init(&config.log_filter);
    for issue in &issues {
        tracing::warn!(%issue, "ignoring configuration value");
    }

    let app = StageLensApp::new(config);
    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "StageLens",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;

    Ok(())
}
