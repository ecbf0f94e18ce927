use eframe::egui;

/// Returns the draft when the user submits it. The text stays in the field
/// until the session confirms the send.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> Option<String> {
    let mut send = false;
    ui.add_enabled_ui(enabled, |ui| {
        ui.horizontal(|ui| {
            let response = ui.text_edit_singleline(input_text);
            if ui.button("Send").clicked() {
                send = true;
            }

            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = true;
            }
        });
    });

    if send && !input_text.trim().is_empty() {
        return Some(input_text.clone());
    }

    None
}
