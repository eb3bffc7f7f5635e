//! User document schema
//!
//! Provider credentials plus the durable per-source sync latches.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use advisor_core::{OAuthTokens, SyncFlags, User, UserId};

use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Stored OAuth token pair
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct TokenDoc {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime>,
}

impl From<OAuthTokens> for TokenDoc {
    fn from(tokens: OAuthTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at.map(DateTime::from_chrono),
        }
    }
}

impl From<TokenDoc> for OAuthTokens {
    fn from(doc: TokenDoc) -> Self {
        Self {
            access_token: doc.access_token,
            refresh_token: doc.refresh_token,
            expires_at: doc.expires_at.map(|at| at.to_chrono()),
        }
    }
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Stable user identifier shared by every other collection
    pub user_id: String,

    /// Lowercased login email
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<TokenDoc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hubspot: Option<TokenDoc>,

    /// `true` while a sync for that source holds the latch
    #[serde(default)]
    pub syncing: SyncFlags,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl From<UserDoc> for User {
    fn from(doc: UserDoc) -> Self {
        Self {
            id: UserId::new(doc.user_id),
            email: doc.email,
            google: doc.google.map(Into::into),
            hubspot: doc.hubspot.map(Into::into),
            syncing: doc.syncing,
        }
    }
}

/// Document path of a source's latch, e.g. `syncing.mailbox`.
pub fn sync_flag_path(source: advisor_core::Source) -> String {
    format!("syncing.{}", source.as_str())
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
