pub mod ids;
pub mod time;

pub use ids::{new_client_msg_id, new_connection_id, new_message_id};
pub use time::format_timestamp;
