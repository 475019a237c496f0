//! `Memory`：捕包字节范围之上的游标化缓冲视图。
//!
//! # 教案定位（Why）
//! - 捕获层交付的是“一段连续字节 + 元数据”，协议编解码需要在这段字节上
//!   做类型化读写、零拷贝切片与链式派生，而不是反复复制；
//! - 本类型对齐评审共识的四元不变量
//!   `0 <= reader_index <= writer_index <= capacity <= max_capacity`，
//!   所有游标与索引操作都在此不变量下验证，越界立即报错、从不钳制。
//!
//! # 核心机制（How）
//! - 底层存储按 `max_capacity` 一次性分配并由 `Arc` 共享，因此
//!   [`Memory::set_capacity`] 只调整逻辑上限、从不搬移内存，
//!   既有切片与副本的别名关系始终有效；
//! - [`Memory::slice_at`] 产生相对索引的零拷贝视图并记录父视图，
//!   透过切片的写入在父视图中立即可见（这一别名语义是承载语义，
//!   不是缺陷）；
//! - 多字节访问经由 [`accessor`](crate::accessor) 的进程级策略完成本机序
//!   载入，再按视图的 [`ByteOrder`] 转换。
//!
//! # 契约说明（What）
//! - **线程模型**：单调用栈同步使用；跨线程同时读写同一存储区间属于
//!   调用方编程错误（与池的 `retain`/`release` 原子性无关）；
//! - **错误语义**：索引/长度越界与可读/可写字节不足一律返回
//!   `buffer.out_of_bounds`，容量超限返回 `buffer.capacity_exceeded`。

use alloc::{boxed::Box, format, sync::Arc, vec, vec::Vec};
use core::{cell::UnsafeCell, fmt};

use tap_core::{CoreError, Result, codes};

use crate::accessor;

/// 多字节字段的解释序。
///
/// 线缆协议以大端为主，因此默认值为 [`ByteOrder::BigEndian`]；
/// [`Memory::byte_order`] 可在不复制的前提下重新解释。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// 大端（网络序）。
    BigEndian,
    /// 小端。
    LittleEndian,
}

/// 共享字节存储。
///
/// # 安全性说明
/// - 通过 `UnsafeCell` 暴露内部可变性，使切片/副本等别名视图可以观察到
///   彼此的写入（Java 原型中的堆外缓冲语义）；
/// - 借用只在单个访问方法内部短暂存在，不会跨调用保留；
/// - 跨线程并发写同一区间属于调用方编程错误，与
///   `PooledBuffer` 式的 `Send`/`Sync` 论证一致：结构切换只发生在
///   独占持有或单调用栈顺序执行时。
pub(crate) struct Storage {
    cell: UnsafeCell<Box<[u8]>>,
}

unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    /// 分配全零存储。
    pub(crate) fn zeroed(len: usize) -> Arc<Self> {
        Arc::new(Self {
            cell: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
        })
    }

    /// 以既有内容建立存储。
    pub(crate) fn from_vec(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            cell: UnsafeCell::new(data.into_boxed_slice()),
        })
    }

    /// 存储总长度。
    pub(crate) fn len(&self) -> usize {
        unsafe { (&*self.cell.get()).len() }
    }

    /// 只读视图；调用方保证借用不跨越别名写入。
    pub(crate) unsafe fn bytes(&self) -> &[u8] {
        unsafe { &*self.cell.get() }
    }

    /// 可写视图；调用方保证借用期间无并发别名访问。
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn bytes_mut(&self) -> &mut [u8] {
        unsafe { &mut *self.cell.get() }
    }
}

/// 游标化字节缓冲视图，详见模块级文档。
#[derive(Clone)]
pub struct Memory {
    storage: Arc<Storage>,
    offset: usize,
    capacity: usize,
    max_capacity: usize,
    reader_index: usize,
    writer_index: usize,
    order: ByteOrder,
    parent: Option<Box<Memory>>,
}

impl Memory {
    /// 分配容量与上限相等的新缓冲（游标均为 0）。
    #[must_use]
    pub fn alloc(capacity: usize) -> Self {
        Self::from_storage(Storage::zeroed(capacity), 0, capacity, capacity, 0, 0)
    }

    /// 分配逻辑容量与上限分离的新缓冲。
    ///
    /// - **错误条件**：`capacity > max_capacity` 时返回
    ///   `buffer.capacity_exceeded`。
    pub fn alloc_bounded(capacity: usize, max_capacity: usize) -> Result<Self> {
        if capacity > max_capacity {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!("初始容量 {capacity} 超过上限 {max_capacity}"),
            ));
        }
        Ok(Self::from_storage(
            Storage::zeroed(max_capacity),
            0,
            capacity,
            max_capacity,
            0,
            0,
        ))
    }

    /// 将外部字节范围（捕获回调、测试夹具）包装为缓冲。
    ///
    /// 内容被复制一次进入自有存储，`writer_index` 指向末尾、
    /// `reader_index` 为 0，随即可直接交给编解码层消费。
    #[must_use]
    pub fn from_slice(data: &[u8]) -> Self {
        let len = data.len();
        Self::from_storage(Storage::from_vec(data.to_vec()), 0, len, len, 0, len)
    }

    pub(crate) fn from_storage(
        storage: Arc<Storage>,
        offset: usize,
        capacity: usize,
        max_capacity: usize,
        reader_index: usize,
        writer_index: usize,
    ) -> Self {
        debug_assert!(offset + max_capacity <= storage.len());
        debug_assert!(reader_index <= writer_index && writer_index <= capacity);
        debug_assert!(capacity <= max_capacity);
        Self {
            storage,
            offset,
            capacity,
            max_capacity,
            reader_index,
            writer_index,
            order: ByteOrder::BigEndian,
            parent: None,
        }
    }

    pub(crate) fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    // ---- 游标与容量 ----

    /// 当前逻辑容量。
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 容量上限。
    #[must_use]
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// 读游标。
    #[must_use]
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    /// 写游标。
    #[must_use]
    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    /// 剩余可读字节数（`writer_index - reader_index`）。
    #[must_use]
    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    /// 剩余可写字节数（`capacity - writer_index`）。
    #[must_use]
    pub fn writable_bytes(&self) -> usize {
        self.capacity - self.writer_index
    }

    /// 是否还有可读字节。
    #[must_use]
    pub fn is_readable(&self) -> bool {
        self.readable_bytes() > 0
    }

    /// 是否还有可写字节。
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable_bytes() > 0
    }

    /// 当前字节序。
    #[must_use]
    pub fn order(&self) -> ByteOrder {
        self.order
    }

    /// 设置读游标；违反 `0 <= reader <= writer` 即报错。
    pub fn set_reader_index(&mut self, reader_index: usize) -> Result<()> {
        if reader_index > self.writer_index {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!(
                    "reader_index {reader_index} 超过 writer_index {}",
                    self.writer_index
                ),
            ));
        }
        self.reader_index = reader_index;
        Ok(())
    }

    /// 设置写游标；违反 `reader <= writer <= capacity` 即报错。
    pub fn set_writer_index(&mut self, writer_index: usize) -> Result<()> {
        if writer_index < self.reader_index || writer_index > self.capacity {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!(
                    "writer_index {writer_index} 不在 [{}, {}] 区间",
                    self.reader_index, self.capacity
                ),
            ));
        }
        self.writer_index = writer_index;
        Ok(())
    }

    /// 一次性设置双游标，先验证再生效，保证失败时状态不变。
    pub fn set_index(&mut self, reader_index: usize, writer_index: usize) -> Result<()> {
        if reader_index > writer_index || writer_index > self.capacity {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!(
                    "游标组合 ({reader_index}, {writer_index}) 违反不变量（capacity {}）",
                    self.capacity
                ),
            ));
        }
        self.reader_index = reader_index;
        self.writer_index = writer_index;
        Ok(())
    }

    /// 双游标归零；内容保持不变。
    pub fn clear(&mut self) {
        self.reader_index = 0;
        self.writer_index = 0;
    }

    /// 跳过 `len` 个可读字节。
    pub fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.check_readable(len)?;
        self.reader_index += len;
        Ok(())
    }

    /// 调整逻辑容量。
    ///
    /// - **错误条件**：`new_capacity > max_capacity` 返回
    ///   `buffer.capacity_exceeded`；
    /// - **收缩语义**：游标超出新容量时收拢到新容量（容量语义，
    ///   非越界钳制）。
    pub fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity > self.max_capacity {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!(
                    "请求容量 {new_capacity} 超过上限 {}",
                    self.max_capacity
                ),
            ));
        }
        self.capacity = new_capacity;
        if self.writer_index > new_capacity {
            self.writer_index = new_capacity;
        }
        if self.reader_index > new_capacity {
            self.reader_index = new_capacity;
        }
        Ok(())
    }

    // ---- 绝对索引访问（不移动游标） ----

    /// 读取 `index` 处的 u8。
    pub fn get_u8(&self, index: usize) -> Result<u8> {
        self.check_index(index, 1)?;
        Ok(self.raw()[self.offset + index])
    }

    /// 读取 `index` 处的 i8。
    pub fn get_i8(&self, index: usize) -> Result<i8> {
        Ok(self.get_u8(index)? as i8)
    }

    /// 读取 `index` 处的 u16（按当前字节序）。
    pub fn get_u16(&self, index: usize) -> Result<u16> {
        self.check_index(index, 2)?;
        let raw = accessor::accessor().get_u16(self.raw(), self.offset + index);
        Ok(match self.order {
            ByteOrder::BigEndian => u16::from_be(raw),
            ByteOrder::LittleEndian => u16::from_le(raw),
        })
    }

    /// 读取 `index` 处的 i16。
    pub fn get_i16(&self, index: usize) -> Result<i16> {
        Ok(self.get_u16(index)? as i16)
    }

    /// 读取 `index` 处的 u32。
    pub fn get_u32(&self, index: usize) -> Result<u32> {
        self.check_index(index, 4)?;
        let raw = accessor::accessor().get_u32(self.raw(), self.offset + index);
        Ok(match self.order {
            ByteOrder::BigEndian => u32::from_be(raw),
            ByteOrder::LittleEndian => u32::from_le(raw),
        })
    }

    /// 读取 `index` 处的 i32。
    pub fn get_i32(&self, index: usize) -> Result<i32> {
        Ok(self.get_u32(index)? as i32)
    }

    /// 读取 `index` 处的 u64。
    pub fn get_u64(&self, index: usize) -> Result<u64> {
        self.check_index(index, 8)?;
        let raw = accessor::accessor().get_u64(self.raw(), self.offset + index);
        Ok(match self.order {
            ByteOrder::BigEndian => u64::from_be(raw),
            ByteOrder::LittleEndian => u64::from_le(raw),
        })
    }

    /// 读取 `index` 处的 i64。
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        Ok(self.get_u64(index)? as i64)
    }

    /// 将 `index` 起的字节复制到 `dst`（长度取 `dst.len()`）。
    pub fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.check_index(index, dst.len())?;
        let base = self.offset + index;
        dst.copy_from_slice(&self.raw()[base..base + dst.len()]);
        Ok(())
    }

    /// 写入 `index` 处的 u8。
    pub fn set_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.check_index(index, 1)?;
        let base = self.offset + index;
        self.raw_mut()[base] = value;
        Ok(())
    }

    /// 写入 `index` 处的 i8。
    pub fn set_i8(&mut self, index: usize, value: i8) -> Result<()> {
        self.set_u8(index, value as u8)
    }

    /// 写入 `index` 处的 u16（按当前字节序）。
    pub fn set_u16(&mut self, index: usize, value: u16) -> Result<()> {
        self.check_index(index, 2)?;
        let raw = match self.order {
            ByteOrder::BigEndian => value.to_be(),
            ByteOrder::LittleEndian => value.to_le(),
        };
        let base = self.offset + index;
        accessor::accessor().set_u16(self.raw_mut(), base, raw);
        Ok(())
    }

    /// 写入 `index` 处的 i16。
    pub fn set_i16(&mut self, index: usize, value: i16) -> Result<()> {
        self.set_u16(index, value as u16)
    }

    /// 写入 `index` 处的 u32。
    pub fn set_u32(&mut self, index: usize, value: u32) -> Result<()> {
        self.check_index(index, 4)?;
        let raw = match self.order {
            ByteOrder::BigEndian => value.to_be(),
            ByteOrder::LittleEndian => value.to_le(),
        };
        let base = self.offset + index;
        accessor::accessor().set_u32(self.raw_mut(), base, raw);
        Ok(())
    }

    /// 写入 `index` 处的 i32。
    pub fn set_i32(&mut self, index: usize, value: i32) -> Result<()> {
        self.set_u32(index, value as u32)
    }

    /// 写入 `index` 处的 u64。
    pub fn set_u64(&mut self, index: usize, value: u64) -> Result<()> {
        self.check_index(index, 8)?;
        let raw = match self.order {
            ByteOrder::BigEndian => value.to_be(),
            ByteOrder::LittleEndian => value.to_le(),
        };
        let base = self.offset + index;
        accessor::accessor().set_u64(self.raw_mut(), base, raw);
        Ok(())
    }

    /// 写入 `index` 处的 i64。
    pub fn set_i64(&mut self, index: usize, value: i64) -> Result<()> {
        self.set_u64(index, value as u64)
    }

    /// 将 `src` 整体写入 `index` 起的区间。
    pub fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.check_index(index, src.len())?;
        let base = self.offset + index;
        self.raw_mut()[base..base + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// 在两个缓冲之间复制 `len` 字节（`self[index..]` → `dst[dst_index..]`）。
    ///
    /// 经由栈/堆暂存完成，因此父视图与其切片之间的重叠区间也能正确复制。
    pub fn copy_to(
        &self,
        index: usize,
        dst: &mut Memory,
        dst_index: usize,
        len: usize,
    ) -> Result<()> {
        self.check_index(index, len)?;
        dst.check_index(dst_index, len)?;
        let staged = self.to_vec(index, len)?;
        dst.set_bytes(dst_index, &staged)
    }

    /// 将 `index` 起的 `len` 字节导出为 `Vec`。
    pub fn to_vec(&self, index: usize, len: usize) -> Result<Vec<u8>> {
        self.check_index(index, len)?;
        let base = self.offset + index;
        Ok(self.raw()[base..base + len].to_vec())
    }

    /// 导出当前可读区间的副本。
    #[must_use]
    pub fn readable_to_vec(&self) -> Vec<u8> {
        let base = self.offset + self.reader_index;
        self.raw()[base..base + self.readable_bytes()].to_vec()
    }

    // ---- 游标相对访问 ----

    /// 读取 u8 并前进读游标。
    pub fn read_u8(&mut self) -> Result<u8> {
        self.check_readable(1)?;
        let value = self.get_u8(self.reader_index)?;
        self.reader_index += 1;
        Ok(value)
    }

    /// 读取 i8 并前进读游标。
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// 读取 u16 并前进读游标。
    pub fn read_u16(&mut self) -> Result<u16> {
        self.check_readable(2)?;
        let value = self.get_u16(self.reader_index)?;
        self.reader_index += 2;
        Ok(value)
    }

    /// 读取 i16 并前进读游标。
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// 读取 u32 并前进读游标。
    pub fn read_u32(&mut self) -> Result<u32> {
        self.check_readable(4)?;
        let value = self.get_u32(self.reader_index)?;
        self.reader_index += 4;
        Ok(value)
    }

    /// 读取 i32 并前进读游标。
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// 读取 u64 并前进读游标。
    pub fn read_u64(&mut self) -> Result<u64> {
        self.check_readable(8)?;
        let value = self.get_u64(self.reader_index)?;
        self.reader_index += 8;
        Ok(value)
    }

    /// 读取 i64 并前进读游标。
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// 读满 `dst` 并前进读游标。
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_readable(dst.len())?;
        self.get_bytes(self.reader_index, dst)?;
        self.reader_index += dst.len();
        Ok(())
    }

    /// 以当前读游标为基准切出 `len` 字节的零拷贝视图并前进读游标。
    ///
    /// 这是链式解析派生“载荷子视图”的标准路径。
    pub fn read_slice(&mut self, len: usize) -> Result<Memory> {
        self.check_readable(len)?;
        let slice = self.slice_at(self.reader_index, len)?;
        self.reader_index += len;
        Ok(slice)
    }

    /// 写入 u8 并前进写游标。
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.check_writable(1)?;
        let index = self.writer_index;
        self.set_u8(index, value)?;
        self.writer_index += 1;
        Ok(())
    }

    /// 写入 i8 并前进写游标。
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    /// 写入 u16 并前进写游标。
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.check_writable(2)?;
        let index = self.writer_index;
        self.set_u16(index, value)?;
        self.writer_index += 2;
        Ok(())
    }

    /// 写入 i16 并前进写游标。
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_u16(value as u16)
    }

    /// 写入 u32 并前进写游标。
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.check_writable(4)?;
        let index = self.writer_index;
        self.set_u32(index, value)?;
        self.writer_index += 4;
        Ok(())
    }

    /// 写入 i32 并前进写游标。
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_u32(value as u32)
    }

    /// 写入 u64 并前进写游标。
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.check_writable(8)?;
        let index = self.writer_index;
        self.set_u64(index, value)?;
        self.writer_index += 8;
        Ok(())
    }

    /// 写入 i64 并前进写游标。
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_u64(value as u64)
    }

    /// 写入整个切片并前进写游标。
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.check_writable(src.len())?;
        let index = self.writer_index;
        self.set_bytes(index, src)?;
        self.writer_index += src.len();
        Ok(())
    }

    /// 从 `src` 的读游标处取 `len` 字节写入本缓冲，双方游标同步前进。
    pub fn write_from(&mut self, src: &mut Memory, len: usize) -> Result<()> {
        src.check_readable(len)?;
        self.check_writable(len)?;
        let staged = src.to_vec(src.reader_index, len)?;
        src.reader_index += len;
        self.write_bytes(&staged)
    }

    // ---- 视图派生 ----

    /// 切出可读区间的零拷贝视图（`slice_at(reader_index, readable_bytes)`）。
    pub fn slice(&self) -> Result<Memory> {
        self.slice_at(self.reader_index, self.readable_bytes())
    }

    /// 切出 `[index, index + length)` 的零拷贝视图。
    ///
    /// # 契约说明
    /// - **错误条件**：`length > capacity - index` 返回越界错误；
    /// - **后置条件**：视图使用相对索引（`capacity == length`、游标为
    ///   `0..length`）、共享底层存储并记录父视图；
    /// - 透过视图的写入在父视图（及其它别名）中立即可见。
    pub fn slice_at(&self, index: usize, length: usize) -> Result<Memory> {
        self.check_index(index, length)?;
        let mut view = Memory::from_storage(
            Arc::clone(&self.storage),
            self.offset + index,
            length,
            length,
            0,
            length,
        );
        view.order = self.order;
        view.parent = Some(Box::new(self.clone()));
        Ok(view)
    }

    /// 返回切片的来源视图；非切片时返回自身的副本视图。
    #[must_use]
    pub fn un_slice(&self) -> Memory {
        match &self.parent {
            Some(parent) => (**parent).clone(),
            None => self.duplicate(),
        }
    }

    /// 共享存储、游标独立的副本视图。
    #[must_use]
    pub fn duplicate(&self) -> Memory {
        self.clone()
    }

    /// 深拷贝 `[index, index + len)` 到全新存储。
    pub fn copy(&self, index: usize, len: usize) -> Result<Memory> {
        let data = self.to_vec(index, len)?;
        Ok(Memory::from_slice(&data))
    }

    /// 深拷贝当前可读区间。
    #[must_use]
    pub fn copy_readable(&self) -> Memory {
        Memory::from_slice(&self.readable_to_vec())
    }

    /// 以指定字节序重新解释的视图（不复制、游标独立）。
    #[must_use]
    pub fn byte_order(&self, order: ByteOrder) -> Memory {
        let mut view = self.clone();
        view.order = order;
        view
    }

    /// 释放缓冲。堆视图没有池归属，恒为 `true` 的空操作；
    /// 池化缓冲的归还语义见 [`PooledMemory`](crate::PooledMemory)。
    pub fn release(&self) -> bool {
        true
    }

    // ---- 内部辅助 ----

    fn raw(&self) -> &[u8] {
        // 借用只存活于单个访问方法内部，见 Storage 的安全性说明。
        unsafe { self.storage.bytes() }
    }

    fn raw_mut(&mut self) -> &mut [u8] {
        unsafe { self.storage.bytes_mut() }
    }

    fn check_index(&self, index: usize, len: usize) -> Result<()> {
        match index.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!(
                    "区间 [{index}, {index}+{len}) 超出容量 {}",
                    self.capacity
                ),
            )),
        }
    }

    fn check_readable(&self, len: usize) -> Result<()> {
        if len > self.readable_bytes() {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("需要 {len} 个可读字节，仅剩 {}", self.readable_bytes()),
            ));
        }
        Ok(())
    }

    fn check_writable(&self, len: usize) -> Result<()> {
        if len > self.writable_bytes() {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("需要 {len} 个可写字节，仅剩 {}", self.writable_bytes()),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory")
            .field("offset", &self.offset)
            .field("capacity", &self.capacity)
            .field("max_capacity", &self.max_capacity)
            .field("reader_index", &self.reader_index)
            .field("writer_index", &self.writer_index)
            .field("order", &self.order)
            .field("sliced", &self.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_read_write_round_trip() {
        let mut mem = Memory::alloc(8);
        mem.write_i32(1).expect("写入首个 int");
        mem.write_i32(2).expect("写入第二个 int");
        mem.set_reader_index(0).expect("重置读游标");
        assert_eq!(mem.read_i32().expect("读取首个 int"), 1);
        assert_eq!(mem.read_i32().expect("读取第二个 int"), 2);
        assert!(!mem.is_readable(), "两个 int 读尽后不应再有可读字节");
    }

    #[test]
    fn absolute_access_does_not_move_cursors() {
        let mut mem = Memory::alloc(16);
        mem.set_u64(4, 0x1122_3344_5566_7788).expect("绝对写入");
        assert_eq!(mem.writer_index(), 0);
        assert_eq!(mem.get_u64(4).expect("绝对读取"), 0x1122_3344_5566_7788);
        assert_eq!(mem.reader_index(), 0);
    }

    #[test]
    fn byte_order_reinterprets_without_copy() {
        let mut mem = Memory::alloc(2);
        mem.set_u16(0, 0x0102).expect("大端写入");
        let le = mem.byte_order(ByteOrder::LittleEndian);
        assert_eq!(le.get_u16(0).expect("小端读取"), 0x0201);
        assert_eq!(mem.get_u16(0).expect("原视图不受影响"), 0x0102);
    }

    #[test]
    fn insufficient_readable_bytes_fail_immediately() {
        let mut mem = Memory::alloc(2);
        mem.write_u8(0xFF).expect("写入单字节");
        mem.set_reader_index(0).expect("重置读游标");
        let err = mem.read_u32().expect_err("可读字节不足必须报错");
        assert_eq!(err.code(), codes::BUFFER_OUT_OF_BOUNDS);
        assert_eq!(mem.reader_index(), 0, "失败的读取不得移动游标");
    }

    #[test]
    fn capacity_growth_respects_max() {
        let mut mem = Memory::alloc_bounded(4, 8).expect("带上限分配");
        mem.set_capacity(8).expect("扩容到上限");
        let err = mem.set_capacity(9).expect_err("超过上限必须报错");
        assert_eq!(err.code(), codes::BUFFER_CAPACITY_EXCEEDED);
    }

    #[test]
    fn slice_writes_are_visible_in_parent() {
        let mut parent = Memory::alloc(8);
        parent.write_bytes(&[0u8; 8]).expect("填充父缓冲");
        let mut slice = parent.slice_at(2, 4).expect("切片");
        slice.set_u16(0, 0xBEEF).expect("透过切片写入");
        assert_eq!(parent.get_u16(2).expect("父视图读取"), 0xBEEF);
    }

    #[test]
    fn un_slice_returns_parent_view() {
        let parent = Memory::alloc(8);
        let slice = parent.slice_at(1, 4).expect("切片");
        let restored = slice.un_slice();
        assert_eq!(restored.capacity(), parent.capacity());
        assert!(
            Arc::ptr_eq(restored.storage(), parent.storage()),
            "un_slice 必须回到父视图的存储"
        );
    }

    #[test]
    fn copy_detaches_from_parent_storage() {
        let mut origin = Memory::alloc(4);
        origin.write_bytes(&[1, 2, 3, 4]).expect("填充");
        let mut copied = origin.copy(0, 4).expect("深拷贝");
        copied.set_u8(0, 9).expect("修改副本");
        assert_eq!(origin.get_u8(0).expect("原缓冲不受影响"), 1);
    }

    #[test]
    fn overlapping_copy_between_parent_and_slice() {
        let mut parent = Memory::alloc(8);
        parent
            .write_bytes(&[1, 2, 3, 4, 5, 6, 7, 8])
            .expect("填充父缓冲");
        let slice = parent.slice_at(0, 4).expect("切片");
        let mut parent_view = slice.un_slice();
        slice.copy_to(0, &mut parent_view, 2, 4).expect("重叠复制");
        assert_eq!(parent.to_vec(0, 8).expect("导出"), [1, 2, 1, 2, 3, 4, 7, 8]);
    }
}
