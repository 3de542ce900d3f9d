use crate::{AppWindow, ChatMessage};
use chat_host_runtime::ConnectionError;
use serde::Deserialize;
use serde_json::Value;
use slint::{ModelRc, SharedString, VecModel};

#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct QuestionAnswer {
    question: String,
    answer: String,
}

/// Fields of the chat state the window renders.
#[derive(Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ChatView {
    chat_titles: Vec<String>,
    current_chat: String,
    selected_chat: Vec<QuestionAnswer>,
    processing: bool,
    is_modal_open: bool,
    attached_files: Vec<String>,
}

impl ChatView {
    fn from_vm(vm: &Value) -> Result<Self, String> {
        serde_json::from_value(vm.clone()).map_err(|err| format!("invalid chat view model: {err}"))
    }
}

pub fn apply(ui: &AppWindow, vm: &Value) -> Result<(), String> {
    let view = ChatView::from_vm(vm)?;

    ui.set_chat_titles(string_model(view.chat_titles));
    ui.set_current_chat(view.current_chat.into());
    ui.set_attached_files(string_model(view.attached_files));
    ui.set_processing(view.processing);
    ui.set_modal_open(view.is_modal_open);

    let messages: Vec<ChatMessage> = view
        .selected_chat
        .into_iter()
        .map(|qa| ChatMessage {
            question: qa.question.into(),
            answer: qa.answer.into(),
        })
        .collect();
    ui.set_messages(ModelRc::new(VecModel::from(messages)));

    Ok(())
}

pub fn banner_text(errors: &[ConnectionError]) -> String {
    match errors {
        [] => String::new(),
        [only] => format!("Connection problem: {only}"),
        [.., last] => format!("Connection problem: {last} ({} errors)", errors.len()),
    }
}

fn string_model(items: Vec<String>) -> ModelRc<SharedString> {
    let items: Vec<SharedString> = items.into_iter().map(SharedString::from).collect();
    ModelRc::new(VecModel::from(items))
}
