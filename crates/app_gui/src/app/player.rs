//! Play/pause button, seek slider and time labels.

use super::UiApp;
use birdcall_core::{PlaybackState, format_ms};
use eframe::egui;
use std::ops::RangeInclusive;

impl UiApp {
    pub(super) fn render_player(&mut self, ui: &mut egui::Ui) {
        let Some(audio) = self.audio.as_mut() else {
            return;
        };
        let enabled = audio.controls_enabled();
        let state = audio.state();
        let position = audio.position();
        if !audio.is_dragging() && state != PlaybackState::Stopped {
            self.seek_value = position.current_ms as f64;
        }

        ui.horizontal(|ui| {
            let label = match state {
                PlaybackState::Playing => "Pause",
                _ => "Play",
            };
            if ui.add_enabled(enabled, egui::Button::new(label)).clicked()
                && let Err(e) = audio.toggle()
            {
                self.status = e.to_string();
            }

            ui.label(format_ms(self.seek_value as u64));

            match slider_range(position.total_ms) {
                Some(range) => {
                    let can_seek = enabled && state != PlaybackState::Stopped;
                    let slider =
                        egui::Slider::new(&mut self.seek_value, range).show_value(false);
                    let resp = ui.add_enabled(can_seek, slider);
                    if resp.drag_started() {
                        audio.begin_seek_drag();
                    }
                    if audio.is_dragging() {
                        audio.update_seek_drag(self.seek_value as i64);
                    }
                    if resp.drag_stopped() {
                        if let Err(e) = audio.end_seek_drag() {
                            self.status = e.to_string();
                        }
                    } else if resp.changed()
                        && !audio.is_dragging()
                        && let Err(e) = audio.seek(self.seek_value as i64)
                    {
                        self.status = e.to_string();
                    }
                }
                // Length not parsed yet: nothing to seek within.
                None => {
                    let mut placeholder = 0.0;
                    ui.add_enabled(
                        false,
                        egui::Slider::new(&mut placeholder, 0.0..=1.0).show_value(false),
                    );
                }
            }

            ui.label(total_text(position.total_ms));
        });
    }
}

/// Slider range for a clip; `None` while the duration is unknown.
fn slider_range(total_ms: Option<u64>) -> Option<RangeInclusive<f64>> {
    total_ms.map(|total| 0.0..=total as f64)
}

fn total_text(total_ms: Option<u64>) -> String {
    match total_ms {
        Some(total) => format_ms(total),
        None => "-:--".to_string(),
    }
}
