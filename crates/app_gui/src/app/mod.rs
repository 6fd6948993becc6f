//! Main window: photo picker, prediction readout and the call player.

mod display;
mod player;

use anyhow::Context;
use birdcall_core::{
    AppConfig, AudioController, Classifier, PlaybackEvent, PlaybackState, PredictionResult,
    PredictionWorker, audio::CpalEngine,
};
use crossbeam::channel::Receiver;
use directories_next::ProjectDirs;
use display::DisplayLoader;
use eframe::{App, Frame, egui};
use rfd::FileDialog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DISPLAY_SIDE: u32 = 380;
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tif", "tiff"];
const BUSY_REPAINT: Duration = Duration::from_millis(100);

pub struct UiApp {
    config: AppConfig,
    worker: Option<PredictionWorker>,
    audio: Option<AudioController<CpalEngine>>,
    audio_events: Option<Receiver<PlaybackEvent>>,
    image_path: Option<PathBuf>,
    texture: Option<egui::TextureHandle>,
    display: DisplayLoader,
    result: Option<PredictionResult>,
    seek_value: f64,
    status: String,
}

impl UiApp {
    pub fn new() -> Self {
        let mut status = Vec::new();

        let config_dir = ProjectDirs::from("org", "birdcall", "BirdCall")
            .map(|dirs| dirs.config_dir().to_path_buf());
        let config = match AppConfig::load_or_default(config_dir.as_deref())
            .and_then(|cfg| cfg.validate().map(|()| cfg))
        {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("Config rejected, using defaults: {e}");
                status.push(format!("Config ignored: {e}"));
                AppConfig::default()
            }
        };

        let worker = match start_worker(&config) {
            Ok(worker) => Some(worker),
            Err(e) => {
                tracing::error!("Classifier unavailable: {e:#}");
                status.push(format!("Classifier unavailable: {e:#}"));
                None
            }
        };

        let audio = match AudioController::with_default_output(&config.audio) {
            Ok(ctl) => Some(ctl),
            Err(e) => {
                tracing::warn!("Audio output unavailable: {e}");
                status.push(format!("Audio unavailable: {e}"));
                None
            }
        };
        let audio_events = audio.as_ref().map(|ctl| ctl.subscribe());

        Self {
            config,
            worker,
            audio,
            audio_events,
            image_path: None,
            texture: None,
            display: DisplayLoader::new(DISPLAY_SIDE),
            result: None,
            seek_value: 0.0,
            status: status.join("\n"),
        }
    }

    fn pick_image(&mut self) {
        let Some(path) = FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        else {
            return;
        };
        self.open_image(path);
    }

    fn open_image(&mut self, path: PathBuf) {
        if self.worker.is_none() {
            return;
        }
        self.result = None;
        self.texture = None;
        if let Some(audio) = self.audio.as_mut() {
            audio.set_resource(None);
        }
        self.display.request(path.clone());
        if let Some(worker) = self.worker.as_mut() {
            worker.submit(path.clone());
        }
        self.status = format!("Identifying {}...", file_name(&path));
        self.image_path = Some(path);
    }

    fn poll_prediction(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        let Some(event) = worker.try_recv() else {
            return;
        };
        match event.outcome {
            Ok(result) => {
                self.status.clear();
                if let Some(audio) = self.audio.as_mut()
                    && !audio.select_label(&result.label)
                {
                    self.status = format!("No call recording for {}", result.label);
                }
                self.seek_value = 0.0;
                self.result = Some(result);
            }
            Err(e) => {
                tracing::warn!("Prediction failed for {}: {e}", event.image_path.display());
                self.status = e.to_string();
            }
        }
    }

    fn poll_audio(&mut self) {
        if let Some(audio) = self.audio.as_mut() {
            audio.pump();
        }
        let Some(events) = self.audio_events.as_ref() else {
            return;
        };
        for event in events.try_iter() {
            match event {
                PlaybackEvent::Error(e) => self.status = e.to_string(),
                PlaybackEvent::PositionTick(ms) => self.seek_value = ms as f64,
                PlaybackEvent::DurationKnown(_) | PlaybackEvent::StateChanged(_) => {}
            }
        }
    }

    fn poll_display(&mut self, ctx: &egui::Context) {
        let Some((path, outcome)) = self.display.try_recv() else {
            return;
        };
        match outcome {
            Ok(color) => {
                let name = format!("photo:{}", path.display());
                self.texture = Some(ctx.load_texture(name, color, egui::TextureOptions::LINEAR));
            }
            // The prediction for the same file reports the failure to the user.
            Err(e) => tracing::warn!("Cannot display {}: {e}", path.display()),
        }
    }

    fn busy(&self) -> bool {
        self.display.is_pending() || self.worker.as_ref().is_some_and(|w| w.is_pending())
    }
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_prediction();
        self.poll_audio();

        self.poll_display(ctx);

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let can_upload = self.worker.is_some();
                if ui
                    .add_enabled(can_upload, egui::Button::new("Upload image..."))
                    .clicked()
                {
                    self.pick_image();
                }
                if self.busy() {
                    ui.spinner();
                }
            });
        });

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            if !self.status.is_empty() {
                ui.label(&self.status);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                match &self.texture {
                    Some(tex) => {
                        ui.image((tex.id(), tex.size_vec2()));
                    }
                    None => {
                        let side = DISPLAY_SIDE as f32;
                        let (rect, _) = ui.allocate_exact_size(
                            egui::vec2(side, side * 0.66),
                            egui::Sense::hover(),
                        );
                        ui.painter()
                            .rect_filled(rect, 4.0, egui::Color32::from_gray(40));
                    }
                }
                ui.add_space(12.0);
                if let Some(result) = &self.result {
                    ui.heading(format!("Species: {}", result.label));
                    ui.label(format!("Confidence: {}", confidence_text(result.confidence)));
                } else if let Some(path) = &self.image_path {
                    ui.label(file_name(path));
                }
                ui.add_space(12.0);
            });
            self.render_player(ui);
        });

        if self.busy() {
            ctx.request_repaint_after(BUSY_REPAINT);
        }
        if self
            .audio
            .as_ref()
            .is_some_and(|a| a.state() == PlaybackState::Playing)
        {
            ctx.request_repaint_after(self.config.audio.tick_interval());
        }
    }
}

fn start_worker(config: &AppConfig) -> anyhow::Result<PredictionWorker> {
    let mut classifier =
        Classifier::from_config(&config.classifier).context("loading class labels")?;
    classifier
        .load(&config.classifier)
        .with_context(|| format!("loading {}", config.classifier.model_path.display()))?;
    PredictionWorker::spawn(Arc::new(classifier)).context("starting prediction thread")
}

fn confidence_text(confidence: f32) -> String {
    format!("{confidence:.1}%")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
