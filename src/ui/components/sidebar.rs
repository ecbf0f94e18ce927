use eframe::egui;

use crate::ui::state::{AppState, LoadStatus};

/// Conversation list. Returns the partner the user clicked, if any.
pub fn render(ui: &mut egui::Ui, state: &AppState) -> Option<String> {
    ui.heading("Messages");
    ui.separator();

    match state.conversations_status {
        LoadStatus::Loading if state.conversations.is_empty() => {
            ui.spinner();
            return None;
        }
        LoadStatus::Failed => {
            ui.colored_label(egui::Color32::RED, "Could not load conversations");
            return None;
        }
        _ => {}
    }

    if state.conversations.is_empty() {
        ui.label("No conversations yet");
        return None;
    }

    let mut selected = None;
    egui::ScrollArea::vertical().show(ui, |ui| {
        for conversation in &state.conversations {
            let is_open = state.is_thread_open(&conversation.partner_id);
            let response = ui
                .group(|ui| {
                    ui.horizontal(|ui| {
                        ui.strong(&conversation.partner_display_name);
                        if conversation.unread_count > 0 {
                            ui.colored_label(
                                egui::Color32::LIGHT_BLUE,
                                format!("({})", conversation.unread_count),
                            );
                        }
                    });
                    ui.label(egui::RichText::new(&conversation.last_message).weak());
                    ui.label(
                        egui::RichText::new(
                            conversation
                                .last_message_at
                                .format("%b %-d, %H:%M")
                                .to_string(),
                        )
                        .small(),
                    );
                })
                .response
                .interact(egui::Sense::click());

            if response.clicked() && !is_open {
                selected = Some(conversation.partner_id.clone());
            }
        }
    });

    selected
}
