mod memory;
mod surreal;

pub use memory::{InMemoryGuestRepository, InMemoryMessageRepository};
pub use surreal::{SurrealGuestRepository, SurrealMessageRepository, surreal_client};
