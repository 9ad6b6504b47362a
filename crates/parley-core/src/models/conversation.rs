use tracing::warn;

use super::message::{Message, Part, Role};

/// A single conversation and its ordered message list.
///
/// The id is `None` until the server's creation call resolves, and is
/// assigned at most once for the life of the session.
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    id: Option<String>,
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<&String> {
        self.id.as_ref()
    }

    /// Assign the server-issued id. Returns false (and leaves the existing
    /// id in place) if one was already assigned.
    pub fn assign_id(&mut self, id: String) -> bool {
        if let Some(existing) = &self.id {
            warn!(existing = %existing, rejected = %id, "conversation id already assigned");
            return false;
        }
        self.id = Some(id);
        true
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The assistant message a stream is currently writing into, if the
    /// most recent message is one.
    pub fn streaming_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut().filter(|m| m.is_assistant())
    }

    /// Append a text delta to the streaming assistant message.
    pub fn append_streaming_text(&mut self, delta: &str) {
        match self.streaming_message_mut() {
            Some(message) => message.content.push_str(delta),
            None => warn!("text delta arrived with no streaming assistant message"),
        }
    }

    /// Append a part to the streaming assistant message. Consecutive
    /// reasoning deltas coalesce into the trailing reasoning part.
    pub fn append_streaming_part(&mut self, part: Part) {
        let Some(message) = self.streaming_message_mut() else {
            warn!("part arrived with no streaming assistant message");
            return;
        };
        if let (Part::Reasoning { text: delta }, Some(Part::Reasoning { text })) =
            (&part, message.parts.last_mut())
        {
            text.push_str(delta);
            return;
        }
        message.parts.push(part);
    }

    /// Remove and return the most recent assistant message (the failed
    /// attempt a retry discards). No-op when the list has none.
    pub fn remove_last_assistant(&mut self) -> Option<Message> {
        let idx = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::Assistant)?;
        Some(self.messages.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_assigned_at_most_once() {
        let mut conv = Conversation::new();
        assert!(conv.id().is_none());
        assert!(conv.assign_id("c-1".to_string()));
        assert!(!conv.assign_id("c-2".to_string()));
        assert_eq!(conv.id().map(String::as_str), Some("c-1"));
    }

    #[test]
    fn test_append_streaming_text() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("hi".to_string(), Vec::new()));
        conv.push_message(Message::assistant_placeholder());
        conv.append_streaming_text("Hello");
        conv.append_streaming_text(", world");
        assert_eq!(conv.messages().last().unwrap().content, "Hello, world");
    }

    #[test]
    fn test_append_text_without_assistant_is_ignored() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("hi".to_string(), Vec::new()));
        conv.append_streaming_text("stray");
        assert_eq!(conv.messages().last().unwrap().content, "hi");
    }

    #[test]
    fn test_reasoning_deltas_coalesce() {
        let mut conv = Conversation::new();
        conv.push_message(Message::assistant_placeholder());
        conv.append_streaming_part(Part::Reasoning {
            text: "step one".to_string(),
        });
        conv.append_streaming_part(Part::Reasoning {
            text: ", step two".to_string(),
        });
        conv.append_streaming_part(Part::Source {
            url: "https://a".to_string(),
            title: None,
        });
        let parts = &conv.messages().last().unwrap().parts;
        assert_eq!(parts.len(), 2);
        assert!(
            matches!(&parts[0], Part::Reasoning { text } if text == "step one, step two")
        );
    }

    #[test]
    fn test_remove_last_assistant() {
        let mut conv = Conversation::new();
        conv.push_message(Message::user("q1".to_string(), Vec::new()));
        let mut failed = Message::assistant_placeholder();
        failed.content = "partial".to_string();
        conv.push_message(failed);

        let removed = conv.remove_last_assistant().expect("one assistant message");
        assert_eq!(removed.content, "partial");
        assert_eq!(conv.message_count(), 1);
        assert!(conv.remove_last_assistant().is_none());
    }
}
