mod app;

use eframe::{NativeOptions, egui};

fn main() {
    tracing_subscriber::fmt::init();
    let title = format!("BirdCall {}", env!("BIRDCALL_VERSION"));
    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([560.0, 720.0]),
        ..Default::default()
    };
    if let Err(e) = eframe::run_native(
        &title,
        options,
        Box::new(|_cc| {
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Box::new(app::UiApp::new()))
        }),
    ) {
        eprintln!("BirdCall stopped with an error: {e}");
    }
}
