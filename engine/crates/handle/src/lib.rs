pub mod allocator;
pub mod types;

pub use allocator::HandleAllocator;
pub use types::{EntityHandle, EntityKind};
