//! Keeps tool results paired with the assistant turn that requested them.

use std::collections::HashSet;

use crate::message::{Message, Role};

/// Drop tool-role messages that do not answer a pending call of the most
/// recent assistant tool request.
///
/// An assistant message with tool calls opens a new pending set; each tool
/// message consumes its id; any other message clears the set. Bounded
/// memories can evict the requesting assistant turn while keeping its
/// results, and providers reject such sequences outright. Applying the
/// repair to an already repaired sequence is a no-op.
pub fn repair_sequence(messages: Vec<Message>) -> Vec<Message> {
    let mut pending: HashSet<String> = HashSet::new();
    let mut repaired = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            Role::Assistant if message.requests_tools() => {
                pending = message
                    .tool_calls
                    .iter()
                    .map(|call| call.id.clone())
                    .collect();
                repaired.push(message);
            }
            Role::Tool => {
                let answered = message
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| pending.remove(id));
                if answered {
                    repaired.push(message);
                } else {
                    tracing::warn!(
                        tool_call_id = message.tool_call_id.as_deref().unwrap_or_default(),
                        tool = message.name.as_deref().unwrap_or_default(),
                        "dropping tool message without a pending call"
                    );
                }
            }
            _ => {
                pending.clear();
                repaired.push(message);
            }
        }
    }

    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "Add", "{}")
    }

    #[test]
    fn keeps_well_formed_sequences() {
        let messages = vec![
            Message::user("add"),
            Message::assistant_tool_calls("", vec![call("a"), call("b")]),
            Message::tool("Add", "a", "1"),
            Message::tool("Add", "b", "2"),
            Message::assistant("3"),
        ];
        assert_eq!(repair_sequence(messages.clone()), messages);
    }

    #[test]
    fn drops_orphaned_tool_results() {
        let messages = vec![
            Message::tool("Add", "evicted", "1"),
            Message::user("again"),
            Message::assistant_tool_calls("", vec![call("a")]),
            Message::tool("Add", "a", "1"),
            Message::tool("Add", "a", "duplicate"),
            Message::tool("Add", "unknown", "x"),
        ];

        let repaired = repair_sequence(messages);
        let ids: Vec<Option<&str>> = repaired
            .iter()
            .map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec![None, None, Some("a")]);
    }

    #[test]
    fn plain_messages_close_the_pending_set() {
        let messages = vec![
            Message::assistant_tool_calls("", vec![call("a")]),
            Message::user("interrupt"),
            Message::tool("Add", "a", "late"),
        ];
        assert_eq!(repair_sequence(messages).len(), 2);
    }

    #[test]
    fn tool_message_without_id_is_dropped() {
        let mut stray = Message::tool("Add", "a", "1");
        stray.tool_call_id = None;
        let messages = vec![
            Message::assistant_tool_calls("", vec![call("a")]),
            stray,
        ];
        assert_eq!(repair_sequence(messages).len(), 1);
    }

    #[test]
    fn repair_is_idempotent() {
        let messages = vec![
            Message::tool("Add", "x", "orphan"),
            Message::assistant_tool_calls("", vec![call("a")]),
            Message::tool("Add", "a", "1"),
            Message::tool("Add", "b", "orphan"),
            Message::assistant("done"),
        ];
        let once = repair_sequence(messages);
        let twice = repair_sequence(once.clone());
        assert_eq!(once, twice);
    }
}
