use serde::{Deserialize, Serialize};

use crate::models::Message;
/*
    http dto for the hydration endpoints consumed before the ws stream
    attaches
*/
// Full history, in store (insertion) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesResponse {
    pub messages: Vec<Message>,
}

// Known conversations: distinct visitor display names, history ∪ live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsResponse {
    pub conversations: Vec<String>,
}
