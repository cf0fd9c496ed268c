use std::sync::Arc;

use farbound_domain::DomainResult;
use farbound_domain::error::DomainError;
use farbound_domain::guest::GuestUser;
use farbound_domain::message::{ChatMessage, Sender};
use farbound_domain::ports::BoxFuture;
use farbound_domain::ports::guest::GuestRepository;
use farbound_domain::ports::message::MessageRepository;
use serde::Deserialize;
use serde_json::Value;
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::db::DbConfig;

const MESSAGE_FIELDS: &str = "\
    message_id,\n\
    text,\n\
    sender,\n\
    is_admin,\n\
    is_read,\n\
    user_id,\n\
    username,\n\
    is_special_offer,\n\
    type::string(created_at) AS created_at";

/// Opens the one connection both repositories share.
pub async fn surreal_client(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(db_config.endpoint.as_str()).await?;
    db.signin(Root {
        username: &db_config.username,
        password: &db_config.password,
    })
    .await?;
    db.use_ns(db_config.namespace.as_str())
        .use_db(db_config.database.as_str())
        .await?;
    Ok(Arc::new(db))
}

fn map_surreal_error(err: surrealdb::Error) -> DomainError {
    DomainError::Storage(format!("surreal query failed: {err}"))
}

fn to_rfc3339(epoch_ms: i64) -> DomainResult<String> {
    let instant = OffsetDateTime::from_unix_timestamp_nanos(epoch_ms as i128 * 1_000_000)
        .map_err(|err| DomainError::Validation(format!("invalid timestamp: {err}")))?;
    Ok(instant
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string()))
}

fn parse_datetime(value: &str) -> DomainResult<i64> {
    let datetime = OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| DomainError::Storage(format!("invalid stored datetime: {err}")))?;
    Ok((datetime.unix_timestamp_nanos() / 1_000_000) as i64)
}

#[derive(Debug, Deserialize)]
struct SurrealMessageRow {
    message_id: String,
    text: String,
    sender: Sender,
    is_admin: bool,
    is_read: bool,
    user_id: Option<String>,
    username: Option<String>,
    is_special_offer: Option<bool>,
    created_at: String,
}

fn decode_message_rows(rows: Vec<Value>) -> DomainResult<Vec<ChatMessage>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<SurrealMessageRow>(row)
                .map_err(|err| DomainError::Storage(format!("invalid message row: {err}")))
                .and_then(map_message_row)
        })
        .collect()
}

fn map_message_row(row: SurrealMessageRow) -> DomainResult<ChatMessage> {
    Ok(ChatMessage {
        id: row.message_id,
        text: row.text,
        sender: row.sender,
        is_admin: row.is_admin,
        timestamp_ms: parse_datetime(&row.created_at)?,
        is_read: row.is_read,
        user_id: row.user_id,
        username: row.username,
        is_special_offer: row.is_special_offer,
    })
}

pub struct SurrealMessageRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealMessageRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl MessageRepository for SurrealMessageRepository {
    fn create_message(&self, message: &ChatMessage) -> BoxFuture<'_, DomainResult<ChatMessage>> {
        let created_at = match to_rfc3339(message.timestamp_ms) {
            Ok(value) => value,
            Err(err) => return Box::pin(async move { Err(err) }),
        };
        let client = self.client.clone();
        let message = message.clone();
        let sender = sender_tag(message.sender).to_string();
        Box::pin(async move {
            let response = client
                .query(
                    "CREATE chat_message CONTENT {\n\
                        message_id: $message_id,\n\
                        text: $text,\n\
                        sender: $sender,\n\
                        is_admin: $is_admin,\n\
                        is_read: $is_read,\n\
                        user_id: $user_id,\n\
                        username: $username,\n\
                        is_special_offer: $is_special_offer,\n\
                        created_at: <datetime>$created_at\n\
                    };",
                )
                .bind(("message_id", message.id.clone()))
                .bind(("text", message.text.clone()))
                .bind(("sender", sender))
                .bind(("is_admin", message.is_admin))
                .bind(("is_read", message.is_read))
                .bind(("user_id", message.user_id.clone()))
                .bind(("username", message.username.clone()))
                .bind(("is_special_offer", message.is_special_offer))
                .bind(("created_at", created_at))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            Ok(message)
        })
    }

    fn list_messages(&self) -> BoxFuture<'_, DomainResult<Vec<ChatMessage>>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT\n{MESSAGE_FIELDS}\n\
                     FROM chat_message\n\
                     ORDER BY created_at ASC, message_id ASC"
                ))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            decode_message_rows(rows)
        })
    }

    fn get_message(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
        let message_id = message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(format!(
                    "SELECT\n{MESSAGE_FIELDS}\n\
                     FROM chat_message\n\
                     WHERE message_id = $message_id\n\
                     LIMIT 1"
                ))
                .bind(("message_id", message_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            Ok(decode_message_rows(rows)?.into_iter().next())
        })
    }

    fn mark_read(&self, message_id: &str) -> BoxFuture<'_, DomainResult<Option<ChatMessage>>> {
        let message_id = message_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "UPDATE chat_message\n\
                     SET is_read = true\n\
                     WHERE message_id = $message_id\n\
                     RETURN\n\
                        message_id,\n\
                        text,\n\
                        sender,\n\
                        is_admin,\n\
                        is_read,\n\
                        user_id,\n\
                        username,\n\
                        is_special_offer,\n\
                        type::string(created_at) AS created_at",
                )
                .bind(("message_id", message_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            Ok(decode_message_rows(rows)?.into_iter().next())
        })
    }
}

fn sender_tag(sender: Sender) -> &'static str {
    match sender {
        Sender::User => "user",
        Sender::Bot => "bot",
    }
}

#[derive(Debug, Deserialize)]
struct SurrealGuestRow {
    user_id: String,
    username: String,
    contact: String,
}

pub struct SurrealGuestRepository {
    client: Arc<Surreal<Client>>,
}

impl SurrealGuestRepository {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }
}

impl GuestRepository for SurrealGuestRepository {
    fn get_by_user_id(&self, user_id: &str) -> BoxFuture<'_, DomainResult<Option<GuestUser>>> {
        let user_id = user_id.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let mut response = client
                .query(
                    "SELECT user_id, username, contact\n\
                     FROM guest_user\n\
                     WHERE user_id = $user_id\n\
                     LIMIT 1",
                )
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| DomainError::Storage(format!("invalid query result: {err}")))?;
            rows.into_iter()
                .next()
                .map(|row| {
                    serde_json::from_value::<SurrealGuestRow>(row)
                        .map_err(|err| DomainError::Storage(format!("invalid guest row: {err}")))
                        .map(|row| GuestUser {
                            user_id: row.user_id,
                            username: row.username,
                            contact: row.contact,
                        })
                })
                .transpose()
        })
    }

    fn create_guest(&self, guest: &GuestUser) -> BoxFuture<'_, DomainResult<GuestUser>> {
        let client = self.client.clone();
        let guest = guest.clone();
        Box::pin(async move {
            let response = client
                .query(
                    "CREATE guest_user CONTENT {\n\
                        user_id: $user_id,\n\
                        username: $username,\n\
                        contact: $contact,\n\
                        created_at: time::now()\n\
                    };",
                )
                .bind(("user_id", guest.user_id.clone()))
                .bind(("username", guest.username.clone()))
                .bind(("contact", guest.contact.clone()))
                .await
                .map_err(map_surreal_error)?;
            response.check().map_err(map_surreal_error)?;
            Ok(guest)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_survives_datetime_column_round_trip() {
        let encoded = to_rfc3339(1_700_000_000_123).expect("encode");
        assert_eq!(parse_datetime(&encoded).expect("decode"), 1_700_000_000_123);
    }

    #[test]
    fn epoch_encodes_as_rfc3339() {
        assert_eq!(to_rfc3339(0).expect("encode"), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn malformed_stored_datetime_is_a_storage_error() {
        let err = parse_datetime("yesterday-ish").unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
