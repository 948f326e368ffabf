use serde::{Deserialize, Serialize};

/// Public projection of a user. The stored credential never leaves the
/// database layer; nothing here carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub image_url: Option<String>,
    pub image_storage_id: Option<String>,
    pub likes: i64,
    pub comments: i64,
    pub created_at: i64,
}

/// A post joined with its owner's current display name and avatar, as the
/// feed returns it. Owner data reflects the profile at read time, not at
/// post-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: Post,
    pub user_name: String,
    pub user_avatar: Option<String>,
}
