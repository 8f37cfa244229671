use serde::{Deserialize, Deserializer, Serialize};

/// Link code issued for the Telegram bot handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkInfo {
    pub link_code: String,
    pub bot_username: String,
    /// `https://t.me/<bot>?start=<code>`
    pub deep_link: String,
}

/// The Telegram account that confirmed the link code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkedAccount {
    #[serde(alias = "telegram_username", alias = "telegramUsername")]
    pub external_username: String,
    #[serde(
        alias = "telegram_user_id",
        alias = "telegramUserId",
        deserialize_with = "string_or_number"
    )]
    pub external_id: String,
}

/// Answer to a single link-status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub linked: bool,
    #[serde(default, alias = "telegramUser", skip_serializing_if = "Option::is_none")]
    pub account: Option<LinkedAccount>,
}

impl LinkStatus {
    pub fn pending() -> Self {
        Self {
            linked: false,
            account: None,
        }
    }

    pub fn linked(account: LinkedAccount) -> Self {
        Self {
            linked: true,
            account: Some(account),
        }
    }

    /// The confirmed account, only when the backend reports a link and
    /// names who linked.
    pub fn confirmed_account(self) -> Option<LinkedAccount> {
        self.linked.then_some(self.account).flatten()
    }
}

/// Outcome of the final deployment call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

/// Telegram user ids arrive as JSON numbers from some backends.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_account_accepts_telegram_field_names() {
        let json = r#"{"telegram_username": "alice", "telegram_user_id": 424242}"#;
        let account: LinkedAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.external_username, "alice");
        assert_eq!(account.external_id, "424242");
    }

    #[test]
    fn link_status_with_telegram_user() {
        let json = r#"{"linked": true, "telegramUser": {"externalUsername": "bob", "externalId": "7"}}"#;
        let status: LinkStatus = serde_json::from_str(json).unwrap();
        let account = status.confirmed_account().unwrap();
        assert_eq!(account.external_username, "bob");
        assert_eq!(account.external_id, "7");
    }

    #[test]
    fn pending_status_has_no_account() {
        let status: LinkStatus = serde_json::from_str(r#"{"linked": false}"#).unwrap();
        assert_eq!(status, LinkStatus::pending());
        assert!(status.confirmed_account().is_none());
    }

    #[test]
    fn linked_without_account_is_not_confirmed() {
        let status = LinkStatus {
            linked: true,
            account: None,
        };
        assert!(status.confirmed_account().is_none());
    }

    #[test]
    fn link_info_is_camel_case() {
        let info = LinkInfo {
            link_code: "123456".into(),
            bot_username: "ostium_bot".into(),
            deep_link: "https://t.me/ostium_bot?start=123456".into(),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["linkCode"], "123456");
        assert_eq!(v["botUsername"], "ostium_bot");
    }
}
