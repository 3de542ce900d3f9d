mod forms;
mod transcript;
mod view_model;

use chat_host_runtime::{ConnectionError, EventChannel, HostBindings, HostConfig};
use serde_json::Value;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

slint::include_modules!();

struct ChatHostBindings;

impl HostBindings for ChatHostBindings {
    type Ui = AppWindow;

    fn new_ui() -> Result<Self::Ui, slint::PlatformError> {
        AppWindow::new()
    }

    fn install(ui: &Self::Ui, channel: EventChannel) {
        forms::install(ui, channel);
        transcript::attach(ui);
    }

    fn apply_render(ui: &Self::Ui, vm: &Value) -> Result<(), String> {
        view_model::apply(ui, vm)
    }

    fn show_connection_errors(ui: &Self::Ui, errors: &[ConnectionError]) {
        ui.set_connection_banner(view_model::banner_text(errors).into());
    }
}

fn main() {
    // stdout carries protocol frames, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = chat_host_runtime::run::<ChatHostBindings>(HostConfig::from_env()) {
        error!(%err, "chat_host fatal error");
        process::exit(1);
    }
}
