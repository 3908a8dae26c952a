// FAT32 module - volume writer and contiguous file allocator

pub mod allocator;
pub mod formatter_native;

pub use allocator::Fat32ContiguousAllocator;
pub use formatter_native::Fat32NativeFormatter;
