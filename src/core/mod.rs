pub mod chat;
pub mod overview;
pub mod task;
pub mod urgency;
