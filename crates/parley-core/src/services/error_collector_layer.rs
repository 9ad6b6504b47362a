use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::time::SystemTime;

use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::Layer;

use crate::models::error_store::{ErrorEntry, ErrorLevel};

/// Visitor to extract fields from tracing events
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value_str = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields.insert(field.name().to_string(), value_str);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

/// Tracing layer that collects WARN and ERROR events into a channel, so
/// swallowed failures (the stop request, fire-and-forget calls) stay
/// visible to a host UI through the `ErrorStore`.
pub struct ErrorCollectorLayer {
    sender: SyncSender<ErrorEntry>,
}

impl ErrorCollectorLayer {
    pub fn new() -> (Self, Receiver<ErrorEntry>) {
        let (tx, rx) = sync_channel(1000); // Bounded to prevent memory exhaustion
        (Self { sender: tx }, rx)
    }
}

impl<S> Layer<S> for ErrorCollectorLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();

        if !matches!(*metadata.level(), Level::WARN | Level::ERROR) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let entry = ErrorEntry {
            timestamp: SystemTime::now(),
            level: if *metadata.level() == Level::ERROR {
                ErrorLevel::Error
            } else {
                ErrorLevel::Warning
            },
            message: visitor.message.unwrap_or_default(),
            target: metadata.target().to_string(),
            file: metadata.file().map(String::from),
            line: metadata.line(),
            fields: visitor.fields,
        };

        // Non-blocking send - drop if channel full (prevents backpressure)
        let _ = self.sender.try_send(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error_store::ErrorStore;
    use tracing_subscriber::layer::SubscriberExt;

    fn setup_collector() -> (impl tracing::Subscriber, Receiver<ErrorEntry>) {
        let (layer, rx) = ErrorCollectorLayer::new();
        let subscriber = tracing_subscriber::registry().with(layer);
        (subscriber, rx)
    }

    #[test]
    fn test_captures_error_events() {
        let (subscriber, rx) = setup_collector();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("stream failed");
        });

        let entry = rx.try_recv().expect("should receive an error entry");
        assert_eq!(entry.level, ErrorLevel::Error);
        assert!(entry.message.contains("stream failed"));
    }

    #[test]
    fn test_captures_warn_events() {
        let (subscriber, rx) = setup_collector();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("stop-generation request failed");
        });

        let entry = rx.try_recv().expect("should receive a warning entry");
        assert_eq!(entry.level, ErrorLevel::Warning);
    }

    #[test]
    fn test_ignores_lower_levels() {
        let (subscriber, rx) = setup_collector();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("just info");
            tracing::debug!("debug noise");
        });

        assert!(rx.try_recv().is_err(), "should not receive any entry");
    }

    #[test]
    fn test_captures_structured_fields() {
        let (subscriber, rx) = setup_collector();
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(conversation_id = "c-1", "stop request failed");
        });

        let entry = rx.try_recv().expect("should receive entry");
        assert_eq!(
            entry.fields.get("conversation_id").map(String::as_str),
            Some("c-1")
        );
    }

    #[test]
    fn test_pump_into_store() {
        let (subscriber, rx) = setup_collector();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!("first");
            tracing::warn!("second");
        });

        let store = ErrorStore::new(10);
        store.pump(&rx);
        assert_eq!(store.error_count(), 1);
        assert_eq!(store.warning_count(), 1);
    }

    #[test]
    fn test_bounded_channel_does_not_panic() {
        let (tx, _rx) = sync_channel(2);
        let layer = ErrorCollectorLayer { sender: tx };
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            for i in 0..10 {
                tracing::error!("overflow event {}", i);
            }
        });
    }
}
