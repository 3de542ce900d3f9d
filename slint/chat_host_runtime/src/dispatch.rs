//! Turns user intents into event batches for the [`Transport`].

use crate::event::{ChatCommand, EventDescriptor, FormData, Handler, StatePath};
use crate::refs::RefScope;
use crate::transport::{ConnectionError, Transport};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// A submitted form as seen by the channel.
pub trait FormElement {
    /// Suppress any native submission behaviour of the toolkit.
    fn prevent_default(&mut self) {}

    /// Named field values in declaration order.
    fn entries(&self) -> Vec<(String, String)>;

    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    Always,
    Never,
}

/// Handlers that accept a whole form as `form_data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormHandler {
    CreateChat,
    ProcessQuestion,
}

impl FormHandler {
    fn command(self, form_data: FormData) -> ChatCommand {
        match self {
            FormHandler::CreateChat => ChatCommand::CreateChat { form_data },
            FormHandler::ProcessQuestion => ChatCommand::ProcessQuestion { form_data },
        }
    }
}

/// Value injected into form data that is not a form field.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Literal(Value),
    /// Read from the [`RefScope`] at submit time; `null` when unresolved.
    Ref(String),
}

/// Static description of one form call site.
#[derive(Debug, Clone)]
pub struct FormBinding {
    handler: FormHandler,
    extra: Vec<(String, ExtraValue)>,
    reset: ResetPolicy,
}

impl FormBinding {
    pub fn new(handler: FormHandler) -> Self {
        Self {
            handler,
            extra: Vec::new(),
            reset: ResetPolicy::Never,
        }
    }

    pub fn extra(mut self, name: impl Into<String>, value: ExtraValue) -> Self {
        self.extra.push((name.into(), value));
        self
    }

    pub fn extra_ref(self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.extra(name, ExtraValue::Ref(key.into()))
    }

    pub fn reset(mut self, policy: ResetPolicy) -> Self {
        self.reset = policy;
        self
    }

    pub fn handler(&self) -> FormHandler {
        self.handler
    }

    pub fn reset_policy(&self) -> ResetPolicy {
        self.reset
    }
}

/// Argument source for a non-form event.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamBinding {
    Literal(Value),
    /// The value carried by the triggering UI event.
    Trigger,
}

#[derive(Clone)]
pub struct EventChannel {
    transport: Arc<dyn Transport>,
    refs: RefScope,
    state: StatePath,
}

impl EventChannel {
    pub fn new(transport: Arc<dyn Transport>, refs: RefScope, state: StatePath) -> Self {
        Self {
            transport,
            refs,
            state,
        }
    }

    pub fn refs(&self) -> &RefScope {
        &self.refs
    }

    pub fn submit_form(&self, form: &mut dyn FormElement, binding: &FormBinding) {
        form.prevent_default();

        let form_data = merge_form_data(form.entries(), &binding.extra, &self.refs);
        let command = binding.handler.command(form_data);
        self.dispatch_commands([command]);

        if binding.reset == ResetPolicy::Always {
            form.reset();
        }
    }

    pub fn dispatch_simple_event(
        &self,
        handler: Handler,
        bindings: &[(&str, ParamBinding)],
        triggering_value: Value,
    ) {
        let mut payload = Map::new();
        for (name, binding) in bindings {
            let value = match binding {
                ParamBinding::Literal(value) => value.clone(),
                ParamBinding::Trigger => triggering_value.clone(),
            };
            payload.insert((*name).to_string(), value);
        }

        let descriptor = EventDescriptor::new(self.state.handler(handler), payload);
        self.transport.dispatch(vec![descriptor]);
    }

    pub fn dispatch_command(&self, command: ChatCommand) {
        self.dispatch_commands([command]);
    }

    /// Deliver every command of one user action as a single ordered batch.
    pub fn dispatch_commands(&self, commands: impl IntoIterator<Item = ChatCommand>) {
        let events: Vec<EventDescriptor> = commands
            .into_iter()
            .map(|command| command.into_descriptor(&self.state))
            .collect();

        if events.is_empty() {
            return;
        }

        debug!(events = events.len(), "dispatching user action");
        self.transport.dispatch(events);
    }

    pub fn connection_errors(&self) -> Vec<ConnectionError> {
        self.transport.connection_errors()
    }
}

/// Form fields first, then extras in declaration order; later keys win.
pub fn merge_form_data(
    entries: Vec<(String, String)>,
    extra: &[(String, ExtraValue)],
    refs: &RefScope,
) -> FormData {
    let mut form_data = FormData::new();

    for (name, value) in entries {
        form_data.insert(name, Value::String(value));
    }

    for (name, value) in extra {
        let value = match value {
            ExtraValue::Literal(value) => value.clone(),
            ExtraValue::Ref(key) => refs.resolve(key).map(Value::String).unwrap_or(Value::Null),
        };
        form_data.insert(name.clone(), value);
    }

    form_data
}
