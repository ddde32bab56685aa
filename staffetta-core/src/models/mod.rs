pub mod message;
pub mod session;

// Re-export per comodità
pub use message::Message;
pub use session::{Role, Session, ADMIN_NAME};
