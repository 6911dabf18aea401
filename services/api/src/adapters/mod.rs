pub mod db;
pub mod kv_file;
pub mod kv_memory;
pub mod records;
pub mod storage;
pub mod subject_store;
pub mod timer_store;

pub use db::DbAdapter;
pub use kv_file::FileKeyValueStore;
pub use kv_memory::MemoryKeyValueStore;
pub use storage::JsonStorage;
pub use subject_store::JsonSubjectStore;
pub use timer_store::JsonTimerStore;
