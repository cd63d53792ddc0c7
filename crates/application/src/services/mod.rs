mod chat_service;
mod message_service;

#[cfg(test)]
mod chat_service_tests;

pub use chat_service::{ChatService, ChatServiceDependencies, LeaveOutcome};
pub use message_service::{MessageService, MessageServiceDependencies};
