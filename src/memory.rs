use std::collections::VecDeque;

use crate::message::Message;

/// Ordered, append-only message store owned by one agent (or by a syndicate
/// for its global history).
///
/// Implementations may bound what `get` returns, but they must return owned
/// copies: callers are free to mutate the result.
pub trait Memory: Send + Sync {
    fn add(&mut self, message: Message);

    fn get(&self) -> Vec<Message>;

    fn len(&self) -> usize {
        self.get().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory transcript storage.
#[derive(Default, Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

impl Memory for ConversationMemory {
    fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn get(&self) -> Vec<Message> {
        self.messages.clone()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Keeps only the last N messages (sliding window). Older messages are evicted
/// on insert, so a tool result can outlive the assistant turn that requested it.
#[derive(Clone, Debug)]
pub struct WindowedMemory {
    window_size: usize,
    messages: VecDeque<Message>,
}

impl WindowedMemory {
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            messages: VecDeque::new(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

impl Memory for WindowedMemory {
    fn add(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.window_size {
            self.messages.pop_front();
        }
    }

    fn get(&self) -> Vec<Message> {
        self.messages.iter().cloned().collect()
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Token-based memory limiting (approximate). Stores everything but only
/// returns the newest messages that fit the budget.
#[derive(Clone, Debug)]
pub struct TokenLimitedMemory {
    max_tokens: usize,
    /// Approximate characters per token (default: 4)
    chars_per_token: usize,
    messages: Vec<Message>,
}

impl TokenLimitedMemory {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            chars_per_token: 4,
            messages: Vec::new(),
        }
    }

    pub fn with_chars_per_token(mut self, chars: usize) -> Self {
        self.chars_per_token = chars.max(1);
        self
    }

    fn estimate_tokens(&self, message: &Message) -> usize {
        let chars = message.content.len()
            + message
                .tool_calls
                .iter()
                .map(|call| call.name.len() + call.arguments.len())
                .sum::<usize>();
        chars / self.chars_per_token
    }

    /// Total messages stored, including those outside the budget.
    pub fn stored(&self) -> usize {
        self.messages.len()
    }
}

impl Memory for TokenLimitedMemory {
    fn add(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn get(&self) -> Vec<Message> {
        let mut total_tokens = 0;
        let mut kept = Vec::new();
        for msg in self.messages.iter().rev() {
            let tokens = self.estimate_tokens(msg);
            if total_tokens + tokens > self.max_tokens {
                break;
            }
            total_tokens += tokens;
            kept.push(msg.clone());
        }
        kept.reverse();
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_memory_returns_copies() {
        let mut memory = ConversationMemory::new();
        memory.add(Message::user("Hello"));

        let mut snapshot = memory.get();
        snapshot[0].content = "mutated".into();
        snapshot.push(Message::assistant("extra"));

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.get()[0].content, "Hello");
    }

    #[test]
    fn windowed_memory_evicts_oldest() {
        let mut memory = WindowedMemory::new(3);
        for text in ["a", "b", "c", "d", "e"] {
            memory.add(Message::user(text));
        }

        let contents: Vec<String> = memory.get().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["c", "d", "e"]);
    }

    #[test]
    fn token_limited_memory_keeps_newest_suffix() {
        let mut memory = TokenLimitedMemory::new(50); // ~200 chars
        memory.add(Message::user("A".repeat(100)));
        memory.add(Message::assistant("B".repeat(100)));
        memory.add(Message::user("C".repeat(100)));

        let context = memory.get();
        assert_eq!(context.len(), 2);
        assert!(context[0].content.starts_with('B'));
        assert!(context[1].content.starts_with('C'));
        assert_eq!(memory.stored(), 3);
    }
}
