use crate::AppWindow;
use chat_host_runtime::{
    ChatCommand, EventChannel, FormBinding, FormElement, FormHandler, Handler, ParamBinding,
    ResetPolicy, UploadedFile,
};
use serde_json::Value;
use slint::ComponentHandle;
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

pub const QUESTION_REF: &str = "question";

struct CreateChatForm<'a> {
    ui: &'a AppWindow,
}

impl FormElement for CreateChatForm<'_> {
    fn entries(&self) -> Vec<(String, String)> {
        vec![(
            "new_chat_name".to_string(),
            self.ui.get_new_chat_name().to_string(),
        )]
    }

    fn reset(&mut self) {
        self.ui.set_new_chat_name("".into());
    }
}

// The question input has no field name; its value is injected from the ref scope.
struct QuestionForm<'a> {
    ui: &'a AppWindow,
}

impl FormElement for QuestionForm<'_> {
    fn entries(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn reset(&mut self) {
        self.ui.set_question_text("".into());
    }
}

pub fn create_chat_binding() -> FormBinding {
    FormBinding::new(FormHandler::CreateChat).reset(ResetPolicy::Never)
}

pub fn question_binding() -> FormBinding {
    FormBinding::new(FormHandler::ProcessQuestion)
        .extra_ref("question", QUESTION_REF)
        .reset(ResetPolicy::Always)
}

/// Accepts a single PDF, matched on its extension.
pub fn pdf_upload(path: &Path) -> Option<UploadedFile> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return None;
    }

    Some(UploadedFile {
        filename: path.file_name()?.to_str()?.to_string(),
        path: path.to_str()?.to_string(),
    })
}

pub fn install(ui: &AppWindow, channel: EventChannel) {
    let question_weak = ui.as_weak();
    channel.refs().register(
        QUESTION_REF,
        Rc::new(move || {
            question_weak
                .upgrade()
                .map(|ui| ui.get_question_text().to_string())
        }),
    );

    let create_weak = ui.as_weak();
    let create_channel = channel.clone();
    let create_binding = create_chat_binding();
    ui.on_create_chat(move || {
        let Some(ui) = create_weak.upgrade() else {
            return;
        };
        create_channel.submit_form(&mut CreateChatForm { ui: &ui }, &create_binding);
    });

    let question_weak = ui.as_weak();
    let question_channel = channel.clone();
    let question_binding = question_binding();
    ui.on_submit_question(move || {
        let Some(ui) = question_weak.upgrade() else {
            return;
        };
        question_channel.submit_form(&mut QuestionForm { ui: &ui }, &question_binding);
    });

    let modal_channel = channel.clone();
    ui.on_modal_open_changed(move |is_open| {
        modal_channel.dispatch_simple_event(
            Handler::SetIsModalOpen,
            &[("is_open", ParamBinding::Trigger)],
            Value::Bool(is_open),
        );
    });

    let select_channel = channel.clone();
    ui.on_select_chat(move |chat_name| {
        select_channel.dispatch_command(ChatCommand::SetChat {
            chat_name: chat_name.to_string(),
        });
    });

    let delete_channel = channel.clone();
    ui.on_delete_chat(move |chat_name| {
        delete_channel.dispatch_command(ChatCommand::DeleteChat {
            chat_name: chat_name.to_string(),
        });
    });

    let upload_channel = channel.clone();
    ui.on_attach_file(move || {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("PDF", &["pdf"])
            .pick_file()
        else {
            return;
        };

        match pdf_upload(&path) {
            Some(file) => upload_channel.dispatch_command(ChatCommand::HandleUpload {
                files: vec![file],
            }),
            None => debug!(path = %path.display(), "ignoring non-pdf attachment"),
        }
    });

    ui.on_remove_attachment(move |filename| {
        channel.dispatch_command(ChatCommand::ClearAttachment {
            filename: filename.to_string(),
        });
    });
}
