pub mod memory;
pub mod traits;

pub use memory::MemoryImageStore;
pub use traits::ImageStore;
