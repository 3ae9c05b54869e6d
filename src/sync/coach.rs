use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::core::chat::{ChatMessage, Conversation, Sender};
use crate::core::task::Task;
use crate::error::CoachError;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Messages of history included in each prompt.
const HISTORY_WINDOW: usize = 5;

static DATA_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:([^;,]*)(?:;[^,]*)?,(.+)$").unwrap());

const FALLBACKS: &[(&str, &str)] = &[
    ("procrastinat", "I understand procrastination can be frustrating. Let's break this down: what specific task are you avoiding? I can help you create smaller, manageable steps that feel less overwhelming."),
    ("deadline", "Deadlines can create pressure! Let me help you create a realistic timeline. When is your deadline, and what does your task involve? I'll help you work backwards to create a manageable schedule."),
    ("focus", "Staying focused is a skill we can build together. Try the 25-minute Focus Sprint: work for 25 minutes, then take a 5-minute break. I can send you reminders to keep you on track!"),
    ("motivat", "Motivation comes and goes, but systems create consistency. Let's identify your 'why' for this task and create small wins that build momentum. What outcome are you hoping to achieve?"),
    ("break down", "Perfect! Let's break down your project step by step. First, tell me: What's the main goal of your project? Then we can identify the key milestones and create actionable tasks for each one."),
    ("schedule", "Great idea! Let's create a realistic schedule. How much time do you typically have available each day? I'll help you optimize your schedule around your natural energy patterns."),
    ("distract", "The distraction blocker feature can help! Let's identify what's pulling your attention away and create strategies to minimize those interruptions during your focus time."),
];

const DEFAULT_FALLBACK: &str = "That's a great point! Can you tell me more about what specific challenges you're facing? I'm here to provide personalized strategies that work for your situation.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoachReply {
    pub text: String,
    pub source: ReplySource,
}

/// Canned reply chosen by the first keyword found in the message.
pub fn fallback_reply(message: &str) -> &'static str {
    let lower = message.to_lowercase();
    FALLBACKS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, reply)| *reply)
        .unwrap_or(DEFAULT_FALLBACK)
}

/// Stateless proxy to a generative-language endpoint acting as a
/// productivity coach.
#[derive(Clone)]
pub struct CoachClient {
    api_key: Option<String>,
    model: String,
    endpoint: String,
    http: Client,
}

impl CoachClient {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Result<Self, CoachError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoachError::Request(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ask the coach and record both sides in the conversation. Never fails:
    /// any endpoint problem yields a keyword fallback reply.
    pub async fn chat(
        &self,
        conversation: &mut Conversation,
        message: ChatMessage,
        tasks: &[Task],
    ) -> CoachReply {
        let reply = match self.generate(conversation, &message, tasks).await {
            Ok(text) => CoachReply {
                text,
                source: ReplySource::Model,
            },
            Err(e) => {
                if e != CoachError::MissingKey {
                    log::warn!("Coach request failed, using fallback: {}", e);
                }
                CoachReply {
                    text: fallback_reply(&message.text).to_string(),
                    source: ReplySource::Fallback,
                }
            }
        };
        conversation.push(message);
        conversation.push(ChatMessage::coach(reply.text.clone()));
        reply
    }

    /// One model round trip. `conversation` holds the history before
    /// `message`.
    pub async fn generate(
        &self,
        conversation: &Conversation,
        message: &ChatMessage,
        tasks: &[Task],
    ) -> Result<String, CoachError> {
        let prompt = build_prompt(conversation, &message.text, tasks);
        let body = request_body(&prompt, message.image.as_deref());
        let resp = self.generate_request(&body)?.send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(CoachError::Api { status, message });
        }

        let data: Value = resp.json().await?;
        extract_text(&data).ok_or(CoachError::EmptyResponse)
    }

    /// Verify the configured key with a minimal request.
    pub async fn check_key(&self) -> Result<(), CoachError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": "Reply with OK" }] }],
            "generationConfig": { "maxOutputTokens": 4 }
        });
        let resp = self.generate_request(&body)?.send().await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            Err(CoachError::Api { status, message })
        }
    }

    fn generate_request(&self, body: &Value) -> Result<RequestBuilder, CoachError> {
        let key = self.api_key.as_deref().ok_or(CoachError::MissingKey)?;
        Ok(self
            .http
            .post(format!("{}/models/{}:generateContent", self.endpoint, self.model))
            .query(&[("key", key)])
            .json(body))
    }
}

fn system_prompt(tasks: &[Task], goal: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are an elite AI productivity coach and task management assistant. Your primary functions are:\n\
         1. Break down complex user requests into actionable tasks (format tasks as numbered or bulleted lists).\n\
         2. Help the user define and focus on one clear goal.\n\
         3. Provide encouraging, concise, and structured advice.\n\
         4. Integrate visual input (images) into your productivity strategy.\n\n",
    );

    let mut context = Vec::new();
    if !tasks.is_empty() {
        let listed: Vec<String> = tasks
            .iter()
            .map(|t| format!("{} {}", if t.completed { '✓' } else { '○' }, t.title))
            .collect();
        context.push(format!("Current tasks: {}", listed.join(", ")));
    }
    if let Some(goal) = goal {
        context.push(format!("Current goal: {}", goal));
    }
    if !context.is_empty() {
        prompt.push_str("--- Current Context ---\n");
        prompt.push_str(&context.join("\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "Always respond in a friendly, motivating, and highly organized manner. \
         If asked for tasks, always provide them in a clear list format.",
    );
    prompt
}

/// Full prompt: system instructions, the last few messages, then the new
/// user message.
pub fn build_prompt(conversation: &Conversation, message: &str, tasks: &[Task]) -> String {
    let mut prompt = system_prompt(tasks, conversation.goal());
    prompt.push_str("\n\n");

    let history = conversation.recent(HISTORY_WINDOW);
    if !history.is_empty() {
        prompt.push_str("Previous conversation:\n");
        for m in history {
            let who = match m.sender {
                Sender::User => "User",
                Sender::Coach => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", who, m.text));
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!("User: {}", message));
    prompt
}

/// Split a `data:` URL into (mime type, base64 payload). A missing mime
/// type defaults to JPEG.
pub fn parse_data_url(url: &str) -> Option<(String, String)> {
    let caps = DATA_URL_RE.captures(url.trim())?;
    let mime = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let mime = if mime.is_empty() { "image/jpeg" } else { mime };
    Some((mime.to_string(), caps[2].to_string()))
}

fn request_body(prompt: &str, image: Option<&str>) -> Value {
    let mut parts = Vec::new();
    if let Some((mime, data)) = image.and_then(parse_data_url) {
        parts.push(json!({ "inline_data": { "mime_type": mime, "data": data } }));
    }
    parts.push(json!({ "text": prompt }));

    json!({
        "contents": [{ "parts": parts }],
        "generationConfig": {
            "temperature": 0.7,
            "maxOutputTokens": 1000
        }
    })
}

fn extract_text(data: &Value) -> Option<String> {
    data["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .and_then(|parts| parts.first())
        .and_then(|p| p["text"].as_str())
        .map(str::to_string)
}
