//! Access log domain model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    Upload,
    View,
    Download,
    Share,
    Return,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::View => "view",
            Self::Download => "download",
            Self::Share => "share",
            Self::Return => "return",
        }
    }
}

impl fmt::Display for AccessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "view" => Ok(Self::View),
            "download" => Ok(Self::Download),
            "share" => Ok(Self::Share),
            "return" => Ok(Self::Return),
            other => Err(format!("Unknown access action: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessLog {
    pub id: i64,
    pub user_id: i64,
    pub file_id: i64,
    pub action: AccessAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    #[serde(with = "time::serde::timestamp")]
    pub timestamp: OffsetDateTime,
}

/// Authenticated caller of an operation, plus request metadata for the log
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub user_id: i64,
    pub is_admin: bool,
    pub is_subscribed: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Viewer {
    pub fn new(user_id: i64, is_admin: bool, is_subscribed: bool) -> Self {
        Self {
            user_id,
            is_admin,
            is_subscribed,
            ..Default::default()
        }
    }

    pub fn with_request(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in [
            AccessAction::Upload,
            AccessAction::View,
            AccessAction::Download,
            AccessAction::Share,
            AccessAction::Return,
        ] {
            assert_eq!(action.as_str().parse::<AccessAction>(), Ok(action));
        }
        assert!("edit".parse::<AccessAction>().is_err());
    }
}
