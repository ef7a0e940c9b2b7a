use crate::{common::constants::KUBE_EVENT_REPORTER_NAME, dogu::Dogu};
use async_trait::async_trait;
use kube::{
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource,
};

#[cfg(test)]
use mockall::automock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Publishes human readable progress events on a Dogu resource.
///
/// Publishing is best-effort: failures are logged, never returned.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, resource: &Dogu, kind: EventKind, reason: &str, note: String);
}

/// [`EventSink`] which records Kubernetes Events.
#[derive(Clone)]
pub struct KubeEventSink {
    client: Client,
    reporter: Reporter,
}

impl KubeEventSink {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: KUBE_EVENT_REPORTER_NAME.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, resource: &Dogu, kind: EventKind, reason: &str, note: String) {
        let recorder = Recorder::new(
            self.client.clone(),
            self.reporter.clone(),
            resource.object_ref(&()),
        );
        let event = Event {
            type_: match kind {
                EventKind::Normal => EventType::Normal,
                EventKind::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(note),
            action: reason.to_string(),
            secondary: None,
        };

        if let Err(error) = recorder.publish(event).await {
            tracing::warn!(
                dogu.name = %resource.spec.name,
                %error,
                "Failed to publish event"
            );
        }
    }
}
