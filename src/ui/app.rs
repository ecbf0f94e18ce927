use chrono::Utc;
use eframe::egui;
use skillswap_chat::common::{ChatCommand, ChatEvent};
use tokio::sync::mpsc;

use super::components::{chat_area, input_bar, sidebar, toasts};
use super::state::{AppState, LoadStatus, Screen};

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<ChatCommand>,
        event_receiver: mpsc::Receiver<ChatEvent>,
    ) -> Self {
        let mut app = Self {
            state: AppState::new(),
            command_sender,
            event_receiver,
        };
        app.send_command(ChatCommand::OpenConversations);
        app
    }

    fn handle_chat_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
        self.state.expire_toasts(Utc::now());
    }

    fn send_command(&mut self, command: ChatCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to chat session: {err}");
        }
    }

    fn render_thread(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Back").clicked() {
                self.send_command(ChatCommand::OpenConversations);
            }
            let title = self
                .state
                .partner_name
                .clone()
                .unwrap_or_else(|| "Loading...".to_string());
            ui.heading(title);
        });
        ui.separator();

        let input_height = 36.0;
        ui.allocate_ui(
            egui::vec2(ui.available_width(), ui.available_height() - input_height),
            |ui| chat_area::render(ui, &self.state),
        );

        ui.separator();
        let enabled = self.state.thread_status == LoadStatus::Ready;
        if let Some(draft) = input_bar::render(ui, &mut self.state.input_text, enabled) {
            self.send_command(ChatCommand::SendMessage { draft });
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_chat_events();

        if self.state.screen == Screen::SignIn {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.heading("Sign in required");
                ui.label("Set a user id (--user or SKILLSWAP_USER_ID) or an access token, then restart.");
            });
            ctx.request_repaint();
            return;
        }

        egui::SidePanel::left("conversation_sidebar").show(ctx, |ui| {
            if let Some(partner_id) = sidebar::render(ui, &self.state) {
                self.send_command(ChatCommand::OpenThread { partner_id });
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| match self.state.screen {
            Screen::Thread => self.render_thread(ui),
            _ => {
                ui.heading("SkillSwap Chat");
                ui.separator();
                ui.label("Select a conversation");
            }
        });

        toasts::render(ctx, &self.state.toasts);
        ctx.request_repaint();
    }
}
