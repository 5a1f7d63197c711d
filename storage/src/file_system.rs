mod offset_store;

pub use offset_store::FileSystemOffsetStore;
