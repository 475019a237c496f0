#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-buffer
//!
//! ## 教案目的（Why）
//! - **定位**：捕包数据面的字节缓冲库：类型化游标缓冲 [`Memory`]、
//!   进程级载入/存储策略（[`accessor`]）与固定槽位的引用计数缓冲池
//!   （[`MemoryPool`]）。
//! - **架构角色**：捕获层交付的字节范围在此被包装为 `Memory`，
//!   协议编解码层只面对缓冲抽象、从不触碰裸指针。
//! - **设计策略**：存储按上限一次成形、容量只做逻辑伸缩，
//!   使切片别名在整个生命周期内保持有效；池化路径以
//!   “不在池中即拒绝”守卫换取热路径上的确定性行为。
//!
//! ## 交互契约（What）
//! - 别名语义：`slice`/`duplicate` 共享存储，透过任一视图的写入对全部
//!   别名可见——这是承载语义，调用方不得假设隔离；
//! - 池化缓冲的访问、retain、release 在引用计数归零后一律失败；
//! - 池耗尽时 `allocate` 立即失败，不提供背压或等待。
//!
//! ## 命名约定（Consistency）
//! - 游标与容量术语沿用评审共识：`reader_index`/`writer_index`/
//!   `capacity`/`max_capacity`，四元不变量见 [`memory`] 模块文档。

extern crate alloc;

pub mod accessor;
mod memory;
mod pool;

pub use accessor::{BytewiseAccessor, RawAccessor, UnalignedAccessor, accessor, select_accessor};
pub use memory::{ByteOrder, Memory};
pub use pool::{MemoryPool, PoolStats, PooledMemory};
