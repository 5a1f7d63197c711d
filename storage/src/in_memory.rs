mod message_store;
mod offset_store;

pub use message_store::InMemoryMessageStore;
pub use offset_store::InMemoryOffsetStore;
