pub mod chat;
pub mod invitations;
pub mod rooms;

pub use chat::{ChatRelay, OutgoingMessage};
pub use invitations::InvitationService;
pub use rooms::{CreateRoomRequest, RoomDetail, RoomService};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use readalong_common::SnowflakeGenerator;

    use super::*;
    use crate::broker::MemoryBroker;
    use crate::db::kv::MemoryStore;
    use crate::directory::memory::MemoryDirectory;
    use crate::directory::Directory;
    use crate::external::{MemoryAccounts, MemoryBlobStore, MemoryCatalog};
    use crate::models::room::Room;
    use crate::presence::PresenceStore;

    /// Services wired to in-memory stores, with handles for seeding and
    /// inspecting them.
    pub struct Fixture {
        pub memory: Arc<MemoryDirectory>,
        pub directory: Directory,
        pub broker: Arc<MemoryBroker>,
        pub catalog: Arc<MemoryCatalog>,
        pub blobs: Arc<MemoryBlobStore>,
        pub presence: PresenceStore,
        pub rooms: RoomService,
        pub invitations: InvitationService,
        pub chat: ChatRelay,
    }

    impl Fixture {
        pub fn new() -> Self {
            let memory = Arc::new(MemoryDirectory::new());
            let directory = Directory::from_store(memory.clone());
            let broker = Arc::new(MemoryBroker::new());
            let catalog = Arc::new(MemoryCatalog::new());
            let blobs = Arc::new(MemoryBlobStore::new());
            let presence = PresenceStore::new(
                Arc::new(MemoryStore::new()),
                broker.clone(),
                Arc::new(MemoryAccounts::new()),
                directory.participants.clone(),
            );
            let rooms = RoomService::new(directory.clone(), catalog.clone(), presence.clone(), broker.clone());
            let invitations = InvitationService::new(directory.clone(), rooms.clone(), broker.clone());
            let chat = ChatRelay::new(
                directory.clone(),
                broker.clone(),
                blobs.clone(),
                Arc::new(SnowflakeGenerator::new(0).unwrap()),
                true,
            );
            Self {
                memory,
                directory,
                broker,
                catalog,
                blobs,
                presence,
                rooms,
                invitations,
                chat,
            }
        }

        /// A chat relay as another instance sharing this one's stores would run it.
        pub fn second_instance(&self, worker_id: u16) -> ChatRelay {
            ChatRelay::new(
                self.directory.clone(),
                self.broker.clone(),
                self.blobs.clone(),
                Arc::new(SnowflakeGenerator::new(worker_id).unwrap()),
                true,
            )
        }

        pub async fn room_with_capacity(&self, host_id: &str, capacity: i32) -> Room {
            let library_id = format!("lib_{host_id}");
            self.catalog
                .add_library_book(&library_id, host_id, "book_1", "Demian", "Hermann Hesse");
            self.rooms
                .create_room(
                    host_id,
                    CreateRoomRequest {
                        library_id,
                        max_capacity: Some(capacity),
                        ..Default::default()
                    },
                )
                .await
                .unwrap()
        }

        pub async fn room_hosted_by(&self, host_id: &str) -> Room {
            self.room_with_capacity(host_id, 8).await
        }
    }
}
