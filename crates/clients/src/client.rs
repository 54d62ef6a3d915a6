use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentkit_events::Event;

/// Client identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub AggregateId);

impl ClientId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How to reach a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: String,
}

impl ContactInfo {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = &self.email {
            let valid = email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
            if !valid {
                return Err(DomainError::validation(format!("invalid email address: {email}")));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    name: String,
    contact: ContactInfo,
    version: u64,
    created: bool,
}

impl Client {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            name: String::new(),
            contact: ContactInfo::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClient {
    pub client_id: ClientId,
    /// New name (if None, keep existing).
    pub name: Option<String>,
    /// New contact info (if None, keep existing).
    pub contact: Option<ContactInfo>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClient(UpdateClient),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientUpdated (full replacement of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdated {
    pub client_id: ClientId,
    pub name: String,
    pub contact: ContactInfo,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientUpdated(ClientUpdated),
}

impl ClientEvent {
    pub fn client_id(&self) -> ClientId {
        match self {
            ClientEvent::ClientRegistered(e) => e.client_id,
            ClientEvent::ClientUpdated(e) => e.client_id,
        }
    }
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientUpdated(_) => "clients.client.updated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.name = e.name.clone();
                self.contact = e.contact.clone();
                self.created = true;
            }
            ClientEvent::ClientUpdated(e) => {
                self.name = e.name.clone();
                self.contact = e.contact.clone();
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClient(cmd) => self.handle_update(cmd),
        }
    }
}

impl Client {
    fn ensure_client_id(&self, client_id: ClientId) -> Result<(), DomainError> {
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        cmd.contact.validate()?;

        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            client_id: cmd.client_id,
            name: cmd.name.trim().to_string(),
            contact: cmd.contact.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClient) -> Result<Vec<ClientEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_client_id(cmd.client_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let contact = cmd.contact.clone().unwrap_or_else(|| self.contact.clone());
        contact.validate()?;

        Ok(vec![ClientEvent::ClientUpdated(ClientUpdated {
            client_id: cmd.client_id,
            name,
            contact,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client_id() -> ClientId {
        ClientId::new(AggregateId::new())
    }

    fn registered(client_id: ClientId) -> Client {
        let mut client = Client::empty(client_id);
        let events = client
            .handle(&ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: "Ana Lopes".to_string(),
                contact: ContactInfo {
                    email: Some("ana@example.com".to_string()),
                    phone: "912345678".to_string(),
                },
                occurred_at: Utc::now(),
            }))
            .unwrap();
        client.apply(&events[0]);
        client
    }

    #[test]
    fn register_emits_client_registered() {
        let client_id = test_client_id();
        let client = registered(client_id);
        assert_eq!(client.name(), "Ana Lopes");
        assert_eq!(client.contact().phone, "912345678");
        assert_eq!(client.version(), 1);
    }

    #[test]
    fn register_rejects_blank_name() {
        let client_id = test_client_id();
        let err = Client::empty(client_id)
            .handle(&ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: "  ".to_string(),
                contact: ContactInfo::default(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn register_rejects_malformed_email() {
        let client_id = test_client_id();
        let err = Client::empty(client_id)
            .handle(&ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: "Rui".to_string(),
                contact: ContactInfo {
                    email: Some("rui-at-example".to_string()),
                    phone: String::new(),
                },
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("rui-at-example")));
    }

    #[test]
    fn email_is_optional() {
        let client_id = test_client_id();
        let events = Client::empty(client_id)
            .handle(&ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: "Rui".to_string(),
                contact: ContactInfo {
                    email: None,
                    phone: "210000000".to_string(),
                },
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn register_twice_conflicts() {
        let client_id = test_client_id();
        let client = registered(client_id);
        let err = client
            .handle(&ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: "Again".to_string(),
                contact: ContactInfo::default(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let client_id = test_client_id();
        let mut client = registered(client_id);
        let events = client
            .handle(&ClientCommand::UpdateClient(UpdateClient {
                client_id,
                name: Some("Ana M. Lopes".to_string()),
                contact: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        client.apply(&events[0]);

        assert_eq!(client.name(), "Ana M. Lopes");
        assert_eq!(client.contact().email.as_deref(), Some("ana@example.com"));
        assert_eq!(client.version(), 2);
    }

    #[test]
    fn update_unknown_client_is_not_found() {
        let client_id = test_client_id();
        let err = Client::empty(client_id)
            .handle(&ClientCommand::UpdateClient(UpdateClient {
                client_id,
                name: None,
                contact: None,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }
}
