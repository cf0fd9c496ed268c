use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::guest::GuestRepository;

/// An unauthenticated visitor's attributed profile, keyed by the
/// client-generated `user_id`. Created once, never deleted by this flow.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuestUser {
    pub user_id: String,
    pub username: String,
    pub contact: String,
}

#[derive(Clone, Debug, Default)]
pub struct GuestSignup {
    pub username: Option<String>,
    pub contact: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestUpsert {
    pub guest: GuestUser,
    pub created: bool,
}

#[derive(Clone)]
pub struct GuestService {
    repository: Arc<dyn GuestRepository>,
}

impl GuestService {
    pub fn new(repository: Arc<dyn GuestRepository>) -> Self {
        Self { repository }
    }

    /// Idempotent by `user_id`: a repeat signup returns the existing record
    /// unchanged instead of creating a duplicate.
    pub async fn upsert(&self, signup: GuestSignup) -> DomainResult<GuestUpsert> {
        let guest = validate_signup(signup)?;

        if let Some(existing) = self.repository.get_by_user_id(&guest.user_id).await? {
            return Ok(GuestUpsert {
                guest: existing,
                created: false,
            });
        }

        let guest = self.repository.create_guest(&guest).await?;
        Ok(GuestUpsert {
            guest,
            created: true,
        })
    }
}

fn validate_signup(signup: GuestSignup) -> DomainResult<GuestUser> {
    let username = required_field(signup.username, "username")?;
    let contact = required_field(signup.contact, "contact")?;
    let user_id = required_field(signup.user_id, "userId")?;
    Ok(GuestUser {
        user_id,
        username,
        contact,
    })
}

fn required_field(value: Option<String>, name: &str) -> DomainResult<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| DomainError::Validation(format!("{name} is required")))
}
