//! Routing Engine: dato un messaggio appena persistito, calcola l'insieme
//! delle connessioni live che devono ricevere il push `newMessage`.
//!
//! La chiave di routing è il display name del visitatore, non un
//! identificatore stabile: sessioni visitatore che condividono lo stesso
//! nome ricevono l'una i messaggi dell'altra. È il comportamento
//! documentato del modello di identità, non un confine di sicurezza.

use staffetta_core::{Message, Role};

use crate::registry::LiveSession;

/// Tutti gli admin live, più i visitatori live il cui display name
/// coincide con la conversazione indicata.
fn fan_out(live: &[LiveSession], conversation: Option<&str>) -> Vec<LiveSession> {
    live.iter()
        .filter(|s| match s.session.role {
            Role::Admin => true,
            Role::Visitor => conversation == Some(s.session.display_name.as_str()),
        })
        .cloned()
        .collect()
}

/// Destinatari di un messaggio persistito.
///
/// - mittente admin: ogni visitatore con display name uguale a
///   `recipient_id`, più ogni sessione admin (così tutte le viste admin
///   restano sincronizzate);
/// - mittente visitatore: ogni sessione admin, più ogni visitatore con lo
///   stesso display name del mittente. L'eco al mittente passa da qui:
///   non esiste una scorciatoia di eco locale.
///
/// I destinatari non sono ordinati tra loro; l'ordine per conversazione è
/// garantito dall'append serializzato e dalle mailbox FIFO.
pub fn recipients(live: &[LiveSession], message: &Message) -> Vec<LiveSession> {
    match message.sender {
        Role::Admin => fan_out(live, message.recipient_id.as_deref()),
        Role::Visitor => fan_out(live, Some(message.sender_id.as_str())),
    }
}

/// Destinatari di un evento di presenza: stessa policy dei messaggi,
/// applicata alla conversazione indicata.
pub fn typing_recipients(live: &[LiveSession], conversation: &str) -> Vec<LiveSession> {
    fan_out(live, Some(conversation))
}
