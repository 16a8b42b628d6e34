//! Narrow interfaces to services this one does not own: the account
//! service (profiles and friendships), the library catalog, and blob
//! storage for chat images.

pub mod blob;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ApiError;
use crate::models::user::{LibraryBook, UserProfile};

pub use blob::{BlobStore, HttpBlobStore, MemoryBlobStore};

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, ApiError>;

    /// Ids of users with an accepted friendship with `user_id`, in either direction.
    async fn friend_ids(&self, user_id: &str) -> Result<Vec<String>, ApiError>;
}

#[async_trait]
pub trait LibraryCatalog: Send + Sync {
    async fn find_library_book(&self, library_id: &str) -> Result<Option<LibraryBook>, ApiError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations, seeded by tests and local runs
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryAccounts {
    profiles: RwLock<HashMap<String, UserProfile>>,
    friendships: RwLock<HashSet<(String, String)>>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user_id: &str, nickname: &str) {
        self.profiles.write().insert(
            user_id.to_string(),
            UserProfile {
                id: user_id.to_string(),
                nickname: nickname.to_string(),
                profile_image_url: None,
            },
        );
    }

    /// Record an accepted friendship. Stored once, read in both directions.
    pub fn add_friendship(&self, a: &str, b: &str) {
        let pair = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.friendships.write().insert(pair);
    }
}

#[async_trait]
impl UserDirectory for MemoryAccounts {
    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, ApiError> {
        Ok(self.profiles.read().get(user_id).cloned())
    }

    async fn friend_ids(&self, user_id: &str) -> Result<Vec<String>, ApiError> {
        let mut ids: Vec<String> = self
            .friendships
            .read()
            .iter()
            .filter_map(|(a, b)| {
                if a == user_id {
                    Some(b.clone())
                } else if b == user_id {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    books: RwLock<HashMap<String, LibraryBook>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_library_book(&self, library_id: &str, owner_id: &str, book_id: &str, title: &str, author: &str) {
        self.books.write().insert(
            library_id.to_string(),
            LibraryBook {
                library_id: library_id.to_string(),
                owner_id: owner_id.to_string(),
                book_id: book_id.to_string(),
                title: title.to_string(),
                author: author.to_string(),
            },
        );
    }
}

#[async_trait]
impl LibraryCatalog for MemoryCatalog {
    async fn find_library_book(&self, library_id: &str) -> Result<Option<LibraryBook>, ApiError> {
        Ok(self.books.read().get(library_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn friendships_read_both_ways() {
        let accounts = MemoryAccounts::new();
        accounts.add_friendship("b", "a");
        accounts.add_friendship("a", "c");

        assert_eq!(accounts.friend_ids("a").await.unwrap(), vec!["b", "c"]);
        assert_eq!(accounts.friend_ids("b").await.unwrap(), vec!["a"]);
        assert!(accounts.friend_ids("z").await.unwrap().is_empty());
    }
}
