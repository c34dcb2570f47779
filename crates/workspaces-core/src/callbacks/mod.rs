//! Typed dispatch table for lifecycle notifications, gates, plugin
//! messages, and video-sink rendering.

mod types;

pub use types::{Callback, CallbackKind, EventPayload, GateFn, NotifyFn, Plugin, RenderFn};

use std::collections::HashMap;

use tracing::debug;
use workspaces_common::{Result, WorkspaceError};

use crate::media::VideoSink;
use crate::protocol::{AttendeeInfo, DataMessage};

const NAMESPACE_SEPARATOR: &str = "::";

#[derive(Default)]
pub struct CallbackRegistry {
    core: HashMap<CallbackKind, Callback>,
    plugins: Vec<String>,
    /// Lifecycle handlers per plugin, in plugin registration order.
    plugin_lifecycle: Vec<(String, CallbackKind, NotifyFn)>,
    /// Message handlers keyed by the full `"<plugin>::<event>"` type.
    plugin_messages: HashMap<String, NotifyFn>,
    renderer: Option<RenderFn>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a core handler. Gates need `Callback::Gate`, everything else
    /// `Callback::Notify`.
    pub fn register(&mut self, kind: CallbackKind, callback: Callback) -> Result<()> {
        if kind.is_gate() != callback.is_gate() {
            return Err(WorkspaceError::InvalidCallback(kind.as_str().to_string()));
        }
        self.core.insert(kind, callback);
        Ok(())
    }

    pub fn unregister(&mut self, kind: CallbackKind) -> bool {
        self.core.remove(&kind).is_some()
    }

    pub fn is_registered(&self, kind: CallbackKind) -> bool {
        self.core.contains_key(&kind)
    }

    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<()> {
        let Plugin {
            name,
            lifecycle,
            messages,
        } = plugin;

        if name.trim().is_empty() || name.contains(NAMESPACE_SEPARATOR) {
            return Err(WorkspaceError::InvalidPlugin(format!("invalid plugin name {name:?}")));
        }
        if self.plugins.contains(&name) {
            return Err(WorkspaceError::InvalidPlugin(format!("{name} is already registered")));
        }
        if let Some((kind, _)) = lifecycle.iter().find(|(kind, _)| kind.is_gate()) {
            return Err(WorkspaceError::InvalidCallback(format!(
                "{name}{NAMESPACE_SEPARATOR}{kind}"
            )));
        }
        if let Some((event, _)) = messages
            .iter()
            .find(|(event, _)| event.is_empty() || event.contains(NAMESPACE_SEPARATOR))
        {
            return Err(WorkspaceError::InvalidCallback(format!(
                "{name}{NAMESPACE_SEPARATOR}{event}"
            )));
        }

        for (kind, handler) in lifecycle {
            self.plugin_lifecycle.push((name.clone(), kind, handler));
        }
        for (event, handler) in messages {
            self.plugin_messages
                .insert(format!("{name}{NAMESPACE_SEPARATOR}{event}"), handler);
        }
        debug!(plugin = %name, "Plugin registered");
        self.plugins.push(name);
        Ok(())
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn is_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p == name)
    }

    /// Run the core handler, then every plugin handler for `kind`.
    pub fn notify(&mut self, kind: CallbackKind, payload: &EventPayload) {
        if let Some(Callback::Notify(handler)) = self.core.get_mut(&kind) {
            handler(payload);
        }
        for (_, plugin_kind, handler) in self.plugin_lifecycle.iter_mut() {
            if *plugin_kind == kind {
                handler(payload);
            }
        }
    }

    /// Ask a gate for a decision, falling back to its default.
    pub fn gate(&mut self, kind: CallbackKind, payload: &EventPayload) -> bool {
        match self.core.get_mut(&kind) {
            Some(Callback::Gate(handler)) => handler(payload),
            _ => kind.gate_default(),
        }
    }

    /// Deliver a data-channel message to its plugin handler. Messages for
    /// unregistered namespaces are dropped.
    pub fn dispatch_message(&mut self, message: &DataMessage) -> bool {
        let Some(namespace) = message.namespace() else {
            return false;
        };
        if !self.is_plugin(namespace) {
            debug!(kind = %message.kind, "Dropping message for unknown plugin");
            return false;
        }
        match self.plugin_messages.get_mut(&message.kind) {
            Some(handler) => {
                handler(&EventPayload::Message(message.data.clone()));
                true
            }
            None => false,
        }
    }

    pub fn set_video_renderer<F>(&mut self, renderer: F)
    where
        F: FnMut(&AttendeeInfo, bool) -> Option<Box<dyn VideoSink>> + Send + 'static,
    {
        self.renderer = Some(Box::new(renderer));
    }

    /// Ask the presentation layer for a sink to render `attendee` into.
    pub fn render_video_sink(&mut self, attendee: &AttendeeInfo, muted: bool) -> Option<Box<dyn VideoSink>> {
        self.renderer.as_mut().and_then(|render| render(attendee, muted))
    }
}
