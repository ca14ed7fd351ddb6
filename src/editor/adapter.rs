use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::widget::EditorWidget;
use crate::models::{ClientEvent, ServerEvent};

/// Origin of a local text-change notification, mirroring the source tag the
/// editing widget attaches to its change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Direct user input.
    User,
    /// Programmatic update (bootstrap, remote apply, tooling).
    Api,
}

/// Bridges a connection's server-event stream to the embedded editing
/// widget, and the widget's local edits back to the relay.
///
/// Invariant: applying a remote delta never re-emits it as a local edit. The
/// local-change path is suspended for the duration of each remote apply, and
/// only changes attributed to direct user input are forwarded at all.
pub struct EditorAdapter<W: EditorWidget> {
    widget: W,
    outbound: UnboundedSender<ClientEvent>,
    applying_remote: bool,
}

impl<W: EditorWidget> EditorAdapter<W> {
    pub fn new(widget: W, outbound: UnboundedSender<ClientEvent>) -> Self {
        Self {
            widget,
            outbound,
            applying_remote: false,
        }
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    /// Feed one server event into the widget.
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::RoomCount { count } => {
                // Editing is only meaningful with a peer to converge with.
                if count <= 1 {
                    self.widget.disable();
                } else {
                    self.widget.enable();
                }
            }
            ServerEvent::RequestCode { requester } => {
                let content = self.widget.contents();
                let _ = self
                    .outbound
                    .send(ClientEvent::SendCode { requester, content });
            }
            ServerEvent::ReceiveCode { content } => {
                self.applying_remote = true;
                self.widget.set_contents(content);
                self.applying_remote = false;
            }
            ServerEvent::CodeChanges { delta } => {
                self.applying_remote = true;
                self.widget.apply_delta(&delta);
                self.applying_remote = false;
            }
            ServerEvent::Pong { date } => {
                debug!("Pong received: {}", date);
            }
        }
    }

    /// Notify the adapter of a widget text change. Only direct user input
    /// reaches the relay; programmatic changes and anything fired during a
    /// remote apply are swallowed.
    pub fn local_change(&mut self, delta: Value, source: ChangeSource) {
        if self.applying_remote || source != ChangeSource::User {
            return;
        }
        let _ = self.outbound.send(ClientEvent::CodeChanges { delta });
    }
}
