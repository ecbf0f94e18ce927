use eframe::egui;
use skillswap_chat::common::Severity;

use crate::ui::state::Toast;

pub fn render(ctx: &egui::Context, toasts: &[Toast]) {
    if toasts.is_empty() {
        return;
    }

    egui::Area::new(egui::Id::new("toasts"))
        .anchor(egui::Align2::RIGHT_BOTTOM, egui::vec2(-12.0, -12.0))
        .show(ctx, |ui| {
            for toast in toasts {
                let color = match toast.notification.severity {
                    Severity::Destructive => egui::Color32::from_rgb(200, 60, 60),
                    Severity::Info => egui::Color32::from_rgb(60, 120, 200),
                };
                egui::Frame::popup(ui.style())
                    .stroke(egui::Stroke::new(1.0, color))
                    .show(ui, |ui| {
                        ui.colored_label(color, &toast.notification.title);
                        ui.label(&toast.notification.description);
                    });
            }
        });
}
