//! Message model representing a synced mailbox message

use super::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provider-native message identifier, unique within an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an address from a header value like "Jane Doe <jane@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// A synced message in its normalized form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub account_id: AccountId,
    pub owner_id: String,
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub subject: String,
    /// Short provider-generated preview, HTML entities decoded
    pub snippet: String,
    /// Plain-text body, truncated to the configured byte limit
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
    pub label_ids: Vec<String>,
    /// Written only by the analysis orchestrator
    pub category: Option<String>,
    /// Written only by the analysis orchestrator
    pub client_id: Option<String>,
    /// Written only by the analysis orchestrator
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn builder(id: MessageId, account_id: AccountId) -> MessageBuilder {
        MessageBuilder::new(id, account_id)
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    account_id: AccountId,
    owner_id: String,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    subject: String,
    snippet: String,
    body: Option<String>,
    received_at: Option<DateTime<Utc>>,
    label_ids: Vec<String>,
}

impl MessageBuilder {
    fn new(id: MessageId, account_id: AccountId) -> Self {
        Self {
            id,
            account_id,
            owner_id: String::new(),
            from: None,
            to: Vec::new(),
            subject: String::new(),
            snippet: String::new(),
            body: None,
            received_at: None,
            label_ids: Vec::new(),
        }
    }

    pub fn owner_id(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn label_ids(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            account_id: self.account_id,
            owner_id: self.owner_id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com")),
            to: self.to,
            subject: self.subject,
            snippet: self.snippet,
            body: self.body,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            label_ids: self.label_ids,
            category: None,
            client_id: None,
            analyzed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("Jane Doe <jane@example.com>");
        assert_eq!(addr.name, Some("Jane Doe".to_string()));
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_email_without_name() {
        let addr = EmailAddress::parse("jane@example.com");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_email_with_angle_brackets_no_name() {
        let addr = EmailAddress::parse("<jane@example.com>");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_display_with_name() {
        let addr = EmailAddress::with_name("Jane Doe", "jane@example.com");
        assert_eq!(addr.display(), "Jane Doe <jane@example.com>");
    }

    #[test]
    fn test_builder_defaults() {
        let msg = Message::builder(MessageId::new("m1"), AccountId::new("a1"))
            .owner_id("user-1")
            .subject("Hello")
            .build();
        assert_eq!(msg.subject, "Hello");
        assert!(msg.category.is_none());
        assert!(msg.analyzed_at.is_none());
    }
}
