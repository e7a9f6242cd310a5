pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{
    CollectionFields, CollectionStore, CollectionUpdate, Link, NewCollection, NewLink,
    StorageError, User, UserStore,
};
