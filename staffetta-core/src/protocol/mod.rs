pub mod http;
pub mod ws;

// Re-export comodi
pub use http::{ListConversationsResponse, ListMessagesResponse};
pub use ws::{Ack, AckStatus, Hello, SendMessage, Typing, WsMessage};
