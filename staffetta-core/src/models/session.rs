use serde::{Deserialize, Serialize};

/// Nome fisso con cui compaiono tutte le sessioni admin sul wire.
pub const ADMIN_NAME: &str = "admin";

/// Ruolo di una connessione live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Visitor,
    Admin,
}

impl Role {
    /// Rappresentazione testuale usata sul wire e nel DB.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Visitor => "visitor",
            Role::Admin => "admin",
        }
    }

    /// Parsing inverso di `as_str`.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "visitor" => Some(Role::Visitor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Sessione live: una connessione registrata presso il relay.
///
/// Il `display_name` è scelto dal visitatore e NON è unico tra sessioni
/// concorrenti: due visitatori con lo stesso nome sono indistinguibili
/// per il routing. Per gli admin vale sempre la costante `ADMIN_NAME`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaco, assegnato dal trasporto, unico per connessione.
    pub connection_id: String,
    pub role: Role,
    pub display_name: String,
}
