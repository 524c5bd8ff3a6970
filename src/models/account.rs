//! User roles and role-dependent account profiles.
//!
//! The account payload returned by the API has a different shape per role.
//! Rather than trusting an embedded tag, the account JSON is decoded
//! explicitly against the role carried alongside it (`Account::from_role_json`),
//! so a role/shape mismatch is a decode error instead of a silent cast.

use std::fmt;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Closed set of user roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "DEVELOPER")]
    Developer,
    #[serde(rename = "CLIENT")]
    Client,
    #[serde(rename = "ADMIN")]
    Admin,
    #[serde(rename = "unassigned")]
    Unassigned,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "DEVELOPER",
            Role::Client => "CLIENT",
            Role::Admin => "ADMIN",
            Role::Unassigned => "unassigned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DEVELOPER" => Some(Role::Developer),
            "CLIENT" => Some(Role::Client),
            "ADMIN" => Some(Role::Admin),
            "unassigned" => Some(Role::Unassigned),
            _ => None,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Unassigned
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client profile: the account that posts projects.
///
/// `deny_unknown_fields` keeps the three account shapes mutually
/// exclusive so a wrong-role payload fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientAccount {
    pub id: i64,
    #[serde(rename = "companyName", default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(rename = "contactEmail", default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    /// Ids of projects owned by this client.
    #[serde(rename = "projectIds", default, skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<i64>,
}

/// Developer profile: bio, skills, and linked external identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeveloperAccount {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(rename = "githubUsername", default, skip_serializing_if = "Option::is_none")]
    pub github_username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
}

/// Admin profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminAccount {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Role-dependent account profile.
///
/// Owned exclusively by the `Session`; never aliased elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum Account {
    Client(ClientAccount),
    Developer(DeveloperAccount),
    Admin(AdminAccount),
}

impl Account {
    /// Shared base identity across all roles.
    pub fn id(&self) -> i64 {
        match self {
            Account::Client(a) => a.id,
            Account::Developer(a) => a.id,
            Account::Admin(a) => a.id,
        }
    }

    /// The role this account shape belongs to.
    pub fn role(&self) -> Role {
        match self {
            Account::Client(_) => Role::Client,
            Account::Developer(_) => Role::Developer,
            Account::Admin(_) => Role::Admin,
        }
    }

    /// Decode an account payload against the role carried alongside it.
    ///
    /// Fails when the role is `Unassigned` or the payload does not match
    /// the role's shape.
    pub fn from_role_json(role: Role, value: &serde_json::Value) -> Result<Self> {
        match role {
            Role::Client => Ok(Account::Client(
                serde_json::from_value(value.clone()).context("account shape does not match CLIENT role")?,
            )),
            Role::Developer => Ok(Account::Developer(
                serde_json::from_value(value.clone())
                    .context("account shape does not match DEVELOPER role")?,
            )),
            Role::Admin => Ok(Account::Admin(
                serde_json::from_value(value.clone()).context("account shape does not match ADMIN role")?,
            )),
            Role::Unassigned => bail!("unassigned role carries no account"),
        }
    }

    /// Serialize the bare profile object (no role tag; the role is stored
    /// separately and drives decoding).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            // Serialization of these derives cannot fail: no maps with
            // non-string keys, no untagged enums.
            Account::Client(a) => serde_json::to_value(a).unwrap_or_default(),
            Account::Developer(a) => serde_json::to_value(a).unwrap_or_default(),
            Account::Admin(a) => serde_json::to_value(a).unwrap_or_default(),
        }
    }
}
