use crate::aggregate::{aggregate_by, summarize};
use crate::config::Config;
use crate::data::{self, export_csv, export_report, fallback_dataset, load_csv_dataset};
use crate::error::DashError;
use crate::lookup::LookupEngine;
use crate::models::{
    AppState, Criteria, Dataset, FallbackPolicy, GroupKey, GroupValue, MatchKind, Source, Tab,
};
use crate::predict::Predictor;
use eframe::egui;
use eframe::egui::{Color32, Ui};
use egui::{Direction, Layout};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints};
use polars::prelude::{AnyValue, DataFrame};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

impl AppState {
    pub fn new(config: Config) -> Self {
        let (dataset, load_notice) = data::load_or_fallback(config.data_path.as_deref(), &config);
        let mut state = AppState {
            use_sample: config.use_sample,
            policy: config.fallback,
            config,
            dataset,
            load_notice,
            selected_tab: Tab::Query,
            age_group_input: String::new(),
            stage_input: String::new(),
            result: None,
            stage_counts: Vec::new(),
            year_counts: Vec::new(),
            chart_notices: Vec::new(),
            age_input: String::new(),
            prediction: None,
            summary: Vec::new(),
            status: None,
            debug_output: String::new(),
            debug_panel_height: 150.0,
            debug_panel_visible: true,
        };
        let dataset = state.dataset.clone();
        refresh_view(&mut state, &dataset);
        state
    }
}

fn set_dataset(state: &mut AppState, dataset: Dataset, notice: Option<String>) {
    tracing::info!(name = %dataset.name, rows = dataset.len(), "dataset selected");
    state.dataset = dataset;
    state.load_notice = notice;
    state.result = None;
    state.prediction = None;
    state.status = None;
    let dataset = state.dataset.clone();
    refresh_view(state, &dataset);
}

/// Recomputes chart series and summary for whatever table is on screen.
fn refresh_view(state: &mut AppState, view: &Dataset) {
    state.chart_notices.clear();
    state.stage_counts = chart_series(view, GroupKey::Stage, &mut state.chart_notices);
    state.year_counts = chart_series(view, GroupKey::Year, &mut state.chart_notices);
    state.summary = match summarize(view) {
        Ok(summary) => summary,
        Err(err) => {
            tracing::warn!(error = %err, "summary not available");
            Vec::new()
        }
    };
}

fn chart_series(view: &Dataset, key: GroupKey, notices: &mut Vec<String>) -> Vec<(GroupValue, u64)> {
    match aggregate_by(view, key) {
        Ok(series) => series,
        Err(DashError::EmptyInput) => {
            if key == GroupKey::Stage {
                notices.push("Nothing to plot: the table has no rows.".to_string());
            }
            Vec::new()
        }
        Err(err) => {
            notices.push(err.to_string());
            Vec::new()
        }
    }
}

fn run_query(state: &mut AppState) {
    let criteria = Criteria::new(&state.age_group_input, &state.stage_input);
    let engine = LookupEngine::new(state.policy);
    match engine.lookup(&state.dataset, &criteria) {
        Ok(result) => {
            tracing::info!(
                outcome = %result.kind.label(),
                rows = result.view.len(),
                total = ?result.total,
                "query"
            );
            let view = result.view.clone();
            refresh_view(state, &view);
            state.result = Some(result);
            state.status = None;
        }
        Err(err) => {
            tracing::error!(error = %err, "query failed");
            state.status = Some(Err(format!("Query failed: {err}")));
        }
    }
}

fn run_prediction(state: &mut AppState) {
    let predictor = Predictor::new(state.config.max_age);
    state.prediction = Some(match state.age_input.trim().parse::<i64>() {
        Ok(age) => predictor
            .predict(&state.dataset, age)
            .map_err(|e| e.to_string()),
        Err(_) => Err(format!(
            "Enter a whole number of years between 0 and {}.",
            predictor.max_age()
        )),
    });
}

fn save_view_csv(state: &mut AppState) {
    let Some(result) = &state.result else {
        return;
    };
    if let Some(path) = FileDialog::new()
        .add_filter("CSV", &["csv"])
        .set_file_name("filtered_data.csv")
        .save_file()
    {
        let outcome = File::create(&path)
            .map_err(DashError::from)
            .and_then(|file| export_csv(&result.view, BufWriter::new(file), &state.config.missing_marker));
        state.status = Some(saved(&path, outcome));
    }
}

fn save_report(state: &mut AppState) {
    let Some(result) = &state.result else {
        return;
    };
    if let Some(path) = FileDialog::new()
        .add_filter("JSON", &["json"])
        .set_file_name("result.json")
        .save_file()
    {
        let outcome = File::create(&path).map_err(DashError::from).and_then(|file| {
            export_report(result, &state.stage_counts, &state.year_counts, BufWriter::new(file))
        });
        state.status = Some(saved(&path, outcome));
    }
}

fn saved(path: &Path, outcome: crate::error::Result<()>) -> Result<String, String> {
    match outcome {
        Ok(()) => {
            tracing::info!(path = %path.display(), "saved");
            Ok(format!("Saved {}", path.display()))
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "save failed");
            Err(format!("Could not save {}: {}", path.display(), err))
        }
    }
}

fn kind_color(kind: &MatchKind) -> Color32 {
    match kind {
        MatchKind::Exact => Color32::GREEN,
        MatchKind::ZeroEstimate | MatchKind::NearestEstimate { .. } => Color32::YELLOW,
        MatchKind::Constructed => Color32::LIGHT_BLUE,
    }
}

fn status_label(ui: &mut Ui, status: &Option<Result<String, String>>) {
    match status {
        Some(Ok(msg)) => {
            ui.colored_label(Color32::GREEN, msg);
        }
        Some(Err(msg)) => {
            ui.colored_label(Color32::RED, msg);
        }
        None => {}
    }
}

pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Data");

    if ui.button("Open CSV").clicked() {
        if let Some(path) = FileDialog::new().add_filter("CSV", &["csv"]).pick_file() {
            match load_csv_dataset(&path, &state.config.load_options()) {
                Ok(dataset) => set_dataset(state, dataset, None),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not load CSV");
                    let notice = format!("Error reading CSV: {err}");
                    let fallback = fallback_dataset(state.use_sample);
                    set_dataset(state, fallback, Some(notice));
                }
            }
        }
    }

    let uploaded = matches!(state.dataset.source, Source::File(_));
    let close_upload = uploaded && ui.button("Close upload").clicked();
    let sample_toggled = ui
        .checkbox(&mut state.use_sample, "Use sample dataset (if no upload)")
        .changed();
    if close_upload || (sample_toggled && !uploaded) {
        let fallback = fallback_dataset(state.use_sample);
        set_dataset(state, fallback, None);
    }

    ui.add_space(8.0);
    ui.label(format!("Dataset: {}", state.dataset.name));
    ui.label(format!(
        "{} rows, {} columns",
        state.dataset.len(),
        state.dataset.columns.names.len()
    ));

    if let Some(notice) = &state.load_notice {
        ui.colored_label(Color32::RED, notice);
    }
    if state.dataset.is_empty() {
        ui.colored_label(
            Color32::YELLOW,
            "No data loaded. Open a CSV or enable the sample dataset.",
        );
    }
    for notice in state.dataset.columns.notices() {
        ui.colored_label(Color32::YELLOW, notice);
    }

    ui.separator();

    ui.label("When nothing matches:");
    egui::ComboBox::from_id_salt("fallback_policy_combo")
        .selected_text(state.policy.label())
        .show_ui(ui, |ui| {
            for policy in FallbackPolicy::ALL {
                ui.selectable_value(&mut state.policy, policy, policy.label());
            }
        });
}

pub fn tab_bar(ui: &mut egui::Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        for &tab in &[Tab::Query, Tab::Charts, Tab::Predict, Tab::Summary] {
            let label = format!("{:?}", tab);
            if ui
                .selectable_label(state.selected_tab == tab, label)
                .clicked()
            {
                state.selected_tab = tab;
            }
        }
    });
}

fn suggestions(ui: &mut Ui, id: &str, options: &[String], target: &mut String) {
    egui::ComboBox::from_id_salt(id)
        .selected_text("pick")
        .width(60.0)
        .show_ui(ui, |ui| {
            for option in options {
                if ui.selectable_label(*target == *option, option).clicked() {
                    *target = option.clone();
                }
            }
        });
}

pub fn query_tab(ctx: &egui::Context, ui: &mut Ui, state: &mut AppState) {
    let age_groups = state.dataset.known_age_groups();
    let stages = state.dataset.known_stages();

    ui.horizontal(|ui| {
        ui.label("Age Group:");
        ui.add(
            egui::TextEdit::singleline(&mut state.age_group_input)
                .hint_text("e.g. 70+, 25-29, Other")
                .desired_width(140.0),
        );
        suggestions(ui, "age_group_pick", &age_groups, &mut state.age_group_input);

        ui.add_space(12.0);
        ui.label("Stage:");
        ui.add(
            egui::TextEdit::singleline(&mut state.stage_input)
                .hint_text("e.g. Stage II, Unknown")
                .desired_width(140.0),
        );
        suggestions(ui, "stage_pick", &stages, &mut state.stage_input);

        ui.add_space(12.0);
        if ui.button("Show Output").clicked() {
            run_query(state);
            ctx.request_repaint();
        }
        if state.result.is_some() && ui.button("Clear").clicked() {
            state.result = None;
            let dataset = state.dataset.clone();
            refresh_view(state, &dataset);
        }
    });

    ui.separator();

    let Some(result) = &state.result else {
        ui.label("Type an Age Group and/or Stage and click Show Output. Preview:");
        ui.separator();
        frame_table(ui, "preview_table", &state.dataset.frame.head(Some(10)), &state.config.missing_marker);
        return;
    };

    ui.colored_label(kind_color(&result.kind), result.kind.label());
    match result.total {
        Some(total) => ui.label(format!("{} row(s), total count {}", result.view.len(), total)),
        None => ui.label(format!("{} row(s)", result.view.len())),
    };

    let mut save_csv = false;
    let mut save_json = false;
    ui.horizontal(|ui| {
        save_csv = ui.button("Save CSV").clicked();
        save_json = ui.button("Save report").clicked();
    });
    status_label(ui, &state.status);

    ui.separator();
    frame_table(ui, "result_table", &result.view.frame, &state.config.missing_marker);

    if save_csv {
        save_view_csv(state);
    }
    if save_json {
        save_report(state);
    }
}

fn cell_text(value: AnyValue<'_>, missing_marker: &str) -> String {
    match value {
        AnyValue::Null => missing_marker.to_string(),
        AnyValue::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

fn frame_table(ui: &mut Ui, id: &str, df: &DataFrame, missing_marker: &str) {
    if df.width() == 0 {
        ui.label("Dataset is empty.");
        return;
    }
    ui.push_id(id, |ui| {
        egui::ScrollArea::both().show(ui, |ui| {
            let cols = df.get_columns();
            let rows = df.height();

            let mut builder = TableBuilder::new(ui)
                .striped(true)
                .cell_layout(Layout::centered_and_justified(Direction::LeftToRight));

            for _ in cols.iter() {
                builder = builder.column(Column::auto());
            }

            let table = builder.header(20.0, |mut header| {
                for column in cols.iter() {
                    header.col(|ui| {
                        ui.strong(column.name().to_string());
                    });
                }
            });

            table.body(|body| {
                body.rows(18.0, rows, |mut row| {
                    let row_idx = row.index();
                    for column in cols.iter() {
                        let text = column
                            .get(row_idx)
                            .map(|v| cell_text(v, missing_marker))
                            .unwrap_or_default();
                        row.col(|ui| {
                            ui.label(text);
                        });
                    }
                });
            });
        });
    });
}

pub fn charts_tab(ui: &mut Ui, state: &mut AppState) {
    match &state.result {
        Some(result) => ui.label(format!("Showing: {}", result.kind.label())),
        None => ui.label("Showing: whole dataset"),
    };
    for notice in &state.chart_notices {
        ui.colored_label(Color32::YELLOW, notice);
    }
    ui.separator();

    ui.columns(2, |columns| {
        columns[0].strong("Stage distribution");
        if state.stage_counts.is_empty() {
            columns[0].label("No Stage data to plot.");
        } else {
            let labels: Vec<String> = state.stage_counts.iter().map(|(k, _)| k.to_string()).collect();
            let bars: Vec<Bar> = state
                .stage_counts
                .iter()
                .enumerate()
                .map(|(i, (label, c))| Bar::new(i as f64, *c as f64).name(label.to_string()))
                .collect();

            Plot::new("stage_chart")
                .height(280.0)
                .allow_drag(false)
                .x_axis_formatter(move |x, _| {
                    let idx = x.value.round();
                    if (x.value - idx).abs() > 1e-6 || idx < 0.0 {
                        return String::new();
                    }
                    labels.get(idx as usize).cloned().unwrap_or_default()
                })
                .show(&mut columns[0], |plot_ui| {
                    plot_ui.bar_chart(BarChart::new(bars).width(0.6));
                });
        }

        columns[1].strong("Year-wise trend");
        if state.year_counts.is_empty() {
            columns[1].label("No Year data to plot.");
        } else {
            let points: Vec<[f64; 2]> = state
                .year_counts
                .iter()
                .filter_map(|(year, c)| match year {
                    GroupValue::Year(y) => Some([*y as f64, *c as f64]),
                    GroupValue::Label(_) => None,
                })
                .collect();

            Plot::new("year_chart")
                .height(280.0)
                .legend(Legend::default())
                .show(&mut columns[1], |plot_ui| {
                    plot_ui.line(Line::new(PlotPoints::from(points)).name("Count"));
                });
        }
    });
}

pub fn predict_tab(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.label(format!("Age (0-{}):", state.config.max_age));
        let response = ui.add(
            egui::TextEdit::singleline(&mut state.age_input)
                .hint_text("e.g. 47")
                .desired_width(80.0),
        );
        let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
        if ui.button("Predict").clicked() || submitted {
            run_prediction(state);
        }
    });

    ui.separator();

    match &state.prediction {
        None => {
            ui.label("Enter an age to see the most frequent stage recorded for its age group.");
        }
        Some(Err(msg)) => {
            ui.colored_label(Color32::RED, msg);
        }
        Some(Ok(prediction)) => {
            ui.label(format!("Age {} falls in age group {}.", prediction.age, prediction.bucket));
            ui.colored_label(kind_color(&prediction.kind), prediction.kind.label());
            match &prediction.most_frequent_stage {
                Some(stage) => {
                    ui.heading(format!("Most frequent stage: {stage}"));
                }
                None => {
                    ui.label("No stage data available for this age group.");
                }
            }
            if let Some(count) = prediction.recorded_count {
                let group = prediction.matched_bucket.as_deref().unwrap_or(&prediction.bucket);
                ui.label(format!("Recorded count for {group}: {count}"));
            }
        }
    }
}

pub fn summary_tab(ui: &mut Ui, state: &mut AppState) {
    if state.summary.is_empty() {
        ui.label("Summary not available.");
        return;
    }
    let fmt = |v: Option<f64>| v.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".to_string());

    ui.push_id("summary_table", |ui| {
        TableBuilder::new(ui)
            .striped(true)
            .columns(Column::auto(), 8)
            .header(20.0, |mut header| {
                for title in ["Column", "Type", "Count", "Nulls", "Distinct", "Min", "Max", "Mean"] {
                    header.col(|ui| {
                        ui.strong(title);
                    });
                }
            })
            .body(|mut body| {
                for summary in &state.summary {
                    body.row(18.0, |mut row| {
                        let cells = [
                            summary.column.clone(),
                            summary.dtype.clone(),
                            summary.count.to_string(),
                            summary.nulls.to_string(),
                            summary.distinct.to_string(),
                            fmt(summary.min),
                            fmt(summary.max),
                            fmt(summary.mean),
                        ];
                        for cell in cells {
                            row.col(|ui| {
                                ui.label(cell);
                            });
                        }
                    });
                }
            });
    });
}
