use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::users;

/// Display identity of a user, owned by the external account service.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = users)]
pub struct UserProfile {
    pub id: String,
    pub nickname: String,
    pub profile_image_url: Option<String>,
}

/// A book in a user's library, resolved from the external catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryBook {
    pub library_id: String,
    pub owner_id: String,
    pub book_id: String,
    pub title: String,
    pub author: String,
}

impl LibraryBook {
    /// Room name used when the host does not pick one.
    pub fn default_room_name(&self) -> String {
        format!("{} - {}", self.title, self.author)
    }
}
