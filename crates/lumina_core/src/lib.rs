pub mod chat;
pub mod domain;
pub mod flashcards;
pub mod memory;
pub mod ports;
pub mod query;
pub mod store;

pub use chat::ChatSession;
pub use domain::{
    ChatMessage, EntityId, EventKind, EventPatch, Flashcard, Folder, FolderPatch, Note, NotePatch,
    Preferences, Role, StudyEvent, Subject, SubjectPatch, TempId,
};
pub use memory::MemoryRemote;
pub use ports::{
    AlertSink, Always, Confirm, PortError, PortResult, PreferenceStore, RemoteStore, StudyAssistant,
};
pub use store::{Deletion, Mutation, Staged, StoreError, StoreResult, StudyStore};
