use eframe::egui;

use crate::ui::state::{AppState, LoadStatus};

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    match state.thread_status {
        LoadStatus::Loading => {
            ui.spinner();
            return;
        }
        LoadStatus::Failed => {
            ui.colored_label(egui::Color32::RED, "Could not load messages");
            return;
        }
        LoadStatus::Ready => {}
    }

    if state.messages.is_empty() {
        ui.label("No messages yet. Say hello!");
        return;
    }

    let own_id = state.user_id.as_deref();
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for message in &state.messages {
                let mine = own_id == Some(message.sender_id.as_str());
                let layout = if mine {
                    egui::Layout::right_to_left(egui::Align::TOP)
                } else {
                    egui::Layout::left_to_right(egui::Align::TOP)
                };
                ui.with_layout(layout, |ui| {
                    ui.label(&message.content);
                    ui.label(
                        egui::RichText::new(message.created_at.format("%H:%M").to_string())
                            .small()
                            .weak(),
                    );
                });
            }
        });
}
