use serde::{Deserialize, Serialize};

use canopy_core::{ClientId, DomainError, Entity};

/// A client the business rents to.
///
/// The phone number doubles as the join key to the client's lead record,
/// which carries the commercial priority used by the cold-lead gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub phone: String,
}

impl Client {
    pub fn new(
        id: ClientId,
        name: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        let phone = phone.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("client name cannot be empty"));
        }
        if phone.trim().is_empty() {
            return Err(DomainError::validation("client phone cannot be empty"));
        }
        Ok(Self { id, name, phone })
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
