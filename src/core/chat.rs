use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Coach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Image attached by the user, as a `data:` URL.
    pub image: Option<String>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            image: None,
        }
    }

    pub fn coach(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Coach,
            text: text.into(),
            timestamp: Utc::now(),
            image: None,
        }
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.image = Some(data_url.into());
        self
    }
}

/// In-memory chat history for one session. Nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    goal: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn goal(&self) -> Option<&str> {
        self.goal.as_deref()
    }

    pub fn set_goal(&mut self, goal: impl Into<String>) {
        let goal = goal.into();
        self.goal = if goal.trim().is_empty() { None } else { Some(goal) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_window() {
        let mut conv = Conversation::new();
        for i in 0..7 {
            conv.push(ChatMessage::user(format!("m{}", i)));
        }
        let recent: Vec<&str> = conv.recent(5).iter().map(|m| m.text.as_str()).collect();
        assert_eq!(recent, vec!["m2", "m3", "m4", "m5", "m6"]);
        assert_eq!(Conversation::new().recent(5).len(), 0);
    }

    #[test]
    fn blank_goal_clears() {
        let mut conv = Conversation::new();
        conv.set_goal("Finish thesis");
        assert_eq!(conv.goal(), Some("Finish thesis"));
        conv.set_goal("  ");
        assert_eq!(conv.goal(), None);
    }
}
