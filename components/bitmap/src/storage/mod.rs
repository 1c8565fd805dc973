//! Storage policies for [`GrowableBitMap`](crate::GrowableBitMap).

mod arena;
mod chunks;
mod heap;
mod resource;

pub use arena::{ArenaAllocator, ArenaBitMap, WordArena};
pub use heap::{CHeapBitMap, HeapAllocator, MemTag};
pub use resource::{ResourceAllocator, ResourceArea, ResourceBitMap, ResourceMark};
