use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// State class that owns every chat handler on the remote side.
pub const DEFAULT_STATE_PATH: &str = "reflex___state____state.reflex_chat___state____state";

pub type FormData = Map<String, Value>;

/// Fully-qualified dotted name of a remote handler (`<state-path>.<method>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerName(String);

impl HandlerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, i.e. the method invoked on the state class.
    pub fn method(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for HandlerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePath(String);

impl StatePath {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self(path.trim_end_matches('.').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn handler(&self, handler: Handler) -> HandlerName {
        HandlerName(format!("{}.{}", self.0, handler.method()))
    }
}

impl Default for StatePath {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }
}

/// Remote handler catalog exposed by the chat state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    CreateChat,
    SetIsModalOpen,
    SetChat,
    DeleteChat,
    ProcessQuestion,
    ClearAttachment,
    HandleUpload,
}

impl Handler {
    pub const ALL: [Handler; 7] = [
        Handler::CreateChat,
        Handler::SetIsModalOpen,
        Handler::SetChat,
        Handler::DeleteChat,
        Handler::ProcessQuestion,
        Handler::ClearAttachment,
        Handler::HandleUpload,
    ];

    pub fn method(self) -> &'static str {
        match self {
            Handler::CreateChat => "create_chat",
            Handler::SetIsModalOpen => "set_is_modal_open",
            Handler::SetChat => "set_chat",
            Handler::DeleteChat => "delete_chat",
            Handler::ProcessQuestion => "process_question",
            Handler::ClearAttachment => "clear_attachment",
            Handler::HandleUpload => "handle_upload",
        }
    }

    /// Parameter names the remote handler declares, in declaration order.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Handler::CreateChat | Handler::ProcessQuestion => &["form_data"],
            Handler::SetIsModalOpen => &["is_open"],
            Handler::SetChat | Handler::DeleteChat => &["chat_name"],
            Handler::ClearAttachment => &["filename"],
            Handler::HandleUpload => &["files"],
        }
    }
}

/// Typed request against the chat state. Building descriptors from this enum
/// keeps payload keys in sync with [`Handler::params`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    CreateChat { form_data: FormData },
    SetIsModalOpen { is_open: bool },
    SetChat { chat_name: String },
    DeleteChat { chat_name: String },
    ProcessQuestion { form_data: FormData },
    ClearAttachment { filename: String },
    HandleUpload { files: Vec<UploadedFile> },
}

impl ChatCommand {
    pub fn handler(&self) -> Handler {
        match self {
            ChatCommand::CreateChat { .. } => Handler::CreateChat,
            ChatCommand::SetIsModalOpen { .. } => Handler::SetIsModalOpen,
            ChatCommand::SetChat { .. } => Handler::SetChat,
            ChatCommand::DeleteChat { .. } => Handler::DeleteChat,
            ChatCommand::ProcessQuestion { .. } => Handler::ProcessQuestion,
            ChatCommand::ClearAttachment { .. } => Handler::ClearAttachment,
            ChatCommand::HandleUpload { .. } => Handler::HandleUpload,
        }
    }

    pub fn into_descriptor(self, state: &StatePath) -> EventDescriptor {
        let name = state.handler(self.handler());
        let mut payload = Map::new();

        match self {
            ChatCommand::CreateChat { form_data } | ChatCommand::ProcessQuestion { form_data } => {
                payload.insert("form_data".to_string(), Value::Object(form_data));
            }
            ChatCommand::SetIsModalOpen { is_open } => {
                payload.insert("is_open".to_string(), Value::Bool(is_open));
            }
            ChatCommand::SetChat { chat_name } | ChatCommand::DeleteChat { chat_name } => {
                payload.insert("chat_name".to_string(), Value::String(chat_name));
            }
            ChatCommand::ClearAttachment { filename } => {
                payload.insert("filename".to_string(), Value::String(filename));
            }
            ChatCommand::HandleUpload { files } => {
                let files = files.into_iter().map(UploadedFile::into_value).collect();
                payload.insert("files".to_string(), Value::Array(files));
            }
        }

        EventDescriptor::new(name, payload)
    }
}

/// A local file offered to the state owner. Only the path travels over the
/// wire; the state owner reads the contents itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub path: String,
}

impl UploadedFile {
    fn into_value(self) -> Value {
        let mut file = Map::new();
        file.insert("filename".to_string(), Value::String(self.filename));
        file.insert("path".to_string(), Value::String(self.path));
        Value::Object(file)
    }
}

/// One remote state mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDescriptor {
    #[serde(rename = "name")]
    pub handler: HandlerName,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl EventDescriptor {
    pub fn new(handler: HandlerName, payload: Map<String, Value>) -> Self {
        Self {
            handler,
            payload,
            metadata: Map::new(),
        }
    }

    /// Descriptor for a handler outside the typed catalog. Payload keys are
    /// only checked by the remote side.
    pub fn raw(handler: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self::new(HandlerName::new(handler), payload)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
