//! Account domain model

use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// Credits granted by one subscription purchase
pub const SUBSCRIPTION_CREDITS: i64 = 30;
/// Length of one subscription period
pub const SUBSCRIPTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_subscribed: bool,
    pub subscription_count: i64,
    #[serde(with = "time::serde::timestamp::option")]
    pub subscription_expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Apply a simulated subscription purchase
    pub fn subscribe(&mut self, now: OffsetDateTime) {
        self.is_subscribed = true;
        self.subscription_count += SUBSCRIPTION_CREDITS;
        self.subscription_expires_at = Some(now + Duration::days(SUBSCRIPTION_DAYS));
    }

    pub fn has_credits(&self) -> bool {
        self.subscription_count > 0
    }
}

/// New account ready to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            id: 1,
            email: "a@b.co".to_string(),
            password_hash: "hash".to_string(),
            is_admin: false,
            is_subscribed: false,
            subscription_count: 0,
            subscription_expires_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_subscribe_adds_credits() {
        let mut user = user();
        let now = OffsetDateTime::UNIX_EPOCH;

        user.subscribe(now);
        user.subscribe(now);

        assert!(user.is_subscribed);
        assert_eq!(user.subscription_count, 60);
        assert_eq!(user.subscription_expires_at, Some(now + Duration::days(30)));
        assert!(user.has_credits());
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@b.co");
    }
}
