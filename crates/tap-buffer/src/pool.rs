//! 固定槽位、引用计数守护的缓冲池。
//!
//! # 模块角色（Why）
//! - 捕包热路径上的缓冲分配必须避开堆抖动：池在构造时一次性建好 N 个
//!   定容槽位，之后的 `allocate`/`release` 只是自由链表出入队；
//! - 池的正确性核心是“不在池中即拒绝”（not in pool guard）：
//!   引用计数归零的缓冲被再次访问、retain 或 release，一律立即报错，
//!   绝不静默容忍。
//!
//! # 核心机制（How）
//! - 自由链表由 `spin::Mutex<Vec<usize>>` 守护；每个槽位携带原子引用
//!   计数与世代号，后者在归还时自增，使“槽位被复用后，旧租约的陈旧
//!   句柄”也能被守卫识别；
//! - `retain`/`release` 使用 `fetch_update` 完成原子递增/递减，持有同一
//!   缓冲副本的多个线程可以无锁并发调用；
//! - 槽位存储按 `slot_ceiling` 预分配，`allocate(size)` 只设定逻辑容量，
//!   之后可经 `set_capacity` 在上限内伸缩。
//!
//! # 契约说明（What）
//! - `allocate` 在池耗尽时**立即失败**（`buffer.pool_exhausted`），
//!   不阻塞、不排队——这是既定的快速失败策略；
//! - `release` 恰好在 1 → 0 的递减上归还槽位；对已归零缓冲的任何操作
//!   返回 `buffer.released`；
//! - 丢弃（drop）一个未释放的 [`PooledMemory`] 不会自动归还槽位，
//!   泄漏会体现在统计的 `active_leases` 中——归还必须是显式的。

use alloc::{format, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use tap_core::{CoreError, Result, codes};

use crate::memory::{Memory, Storage};

/// 池状态快照，供监控与测试断言使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// 槽位总数。
    pub slot_count: usize,
    /// 单槽容量上限。
    pub slot_ceiling: usize,
    /// 当前空闲槽位数。
    pub free_slots: usize,
    /// 当前在外的活跃租约数。
    pub active_leases: usize,
    /// 累计成功分配次数。
    pub total_allocations: usize,
    /// 累计归还次数。
    pub total_releases: usize,
    /// 累计快速失败（池耗尽）的分配次数。
    pub failed_allocations: usize,
}

struct Slot {
    storage: Arc<Storage>,
    ref_cnt: AtomicI64,
    generation: AtomicU64,
}

#[derive(Default)]
struct PoolMetrics {
    total_allocations: AtomicUsize,
    total_releases: AtomicUsize,
    failed_allocations: AtomicUsize,
    active_leases: AtomicUsize,
}

struct PoolInner {
    slots: Vec<Slot>,
    free: Mutex<Vec<usize>>,
    metrics: PoolMetrics,
    ceiling: usize,
}

/// 固定槽位缓冲池，详见模块级文档。
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    /// 创建含 `slot_count` 个槽位、单槽上限 `slot_ceiling` 字节的池。
    ///
    /// - **错误条件**：槽位数或上限为 0 时返回 `buffer.capacity_exceeded`。
    pub fn new(slot_count: usize, slot_ceiling: usize) -> Result<Self> {
        if slot_count == 0 || slot_ceiling == 0 {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!("非法的池参数：slot_count={slot_count}, slot_ceiling={slot_ceiling}"),
            ));
        }
        let slots = (0..slot_count)
            .map(|_| Slot {
                storage: Storage::zeroed(slot_ceiling),
                ref_cnt: AtomicI64::new(0),
                generation: AtomicU64::new(0),
            })
            .collect();
        // 低序号槽位位于向量尾部，先被取用，便于测试推断复用顺序。
        let free = (0..slot_count).rev().collect();
        Ok(Self {
            inner: Arc::new(PoolInner {
                slots,
                free: Mutex::new(free),
                metrics: PoolMetrics::default(),
                ceiling: slot_ceiling,
            }),
        })
    }

    /// 租借一个逻辑容量为 `size` 的缓冲（游标归零）。
    ///
    /// # 契约说明
    /// - **错误条件**：`size > slot_ceiling` 返回 `buffer.capacity_exceeded`；
    ///   池耗尽返回 `buffer.pool_exhausted`，**不阻塞等待**；
    /// - **后置条件**：返回缓冲的引用计数为 1，`max_capacity` 等于
    ///   槽位上限，可经 `set_capacity` 继续伸缩。
    pub fn allocate(&self, size: usize) -> Result<PooledMemory> {
        self.allocate_with(size, self.inner.ceiling, 0, 0)
    }

    /// 以完整的游标状态重建一个池化缓冲。
    ///
    /// 构建器在原地重写既有报文后，用该入口把“容量 + 双游标”一次性
    /// 恢复到改写前的形态。
    ///
    /// # 契约说明
    /// - **前置条件**：`reader_index <= writer_index <= capacity <=
    ///   max_capacity <= slot_ceiling`；
    /// - **错误条件**：违反前置条件按语义分别返回越界或容量错误；
    ///   池耗尽返回 `buffer.pool_exhausted`。
    pub fn allocate_with(
        &self,
        capacity: usize,
        max_capacity: usize,
        reader_index: usize,
        writer_index: usize,
    ) -> Result<PooledMemory> {
        if max_capacity > self.inner.ceiling || capacity > max_capacity {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!(
                    "请求容量 ({capacity}/{max_capacity}) 超出槽位上限 {}",
                    self.inner.ceiling
                ),
            ));
        }
        if reader_index > writer_index || writer_index > capacity {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("游标组合 ({reader_index}, {writer_index}) 违反缓冲不变量"),
            ));
        }
        let Some(slot_id) = self.inner.free.lock().pop() else {
            self.inner
                .metrics
                .failed_allocations
                .fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::new(
                codes::BUFFER_POOL_EXHAUSTED,
                "池中已无空闲槽位（快速失败，不等待）",
            ));
        };
        let slot = &self.inner.slots[slot_id];
        slot.ref_cnt.store(1, Ordering::Release);
        self.inner
            .metrics
            .total_allocations
            .fetch_add(1, Ordering::Relaxed);
        self.inner
            .metrics
            .active_leases
            .fetch_add(1, Ordering::Relaxed);
        let mut memory = Memory::from_storage(
            Arc::clone(&slot.storage),
            0,
            capacity,
            max_capacity,
            0,
            0,
        );
        memory.set_index(reader_index, writer_index)?;
        Ok(PooledMemory {
            memory,
            slot_id,
            generation: slot.generation.load(Ordering::Acquire),
            pool: Arc::clone(&self.inner),
        })
    }

    /// 读取统计快照。
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let metrics = &self.inner.metrics;
        PoolStats {
            slot_count: self.inner.slots.len(),
            slot_ceiling: self.inner.ceiling,
            free_slots: self.inner.free.lock().len(),
            active_leases: metrics.active_leases.load(Ordering::Relaxed),
            total_allocations: metrics.total_allocations.load(Ordering::Relaxed),
            total_releases: metrics.total_releases.load(Ordering::Relaxed),
            failed_allocations: metrics.failed_allocations.load(Ordering::Relaxed),
        }
    }
}

/// 池化缓冲租约：槽位 id + 原子引用计数 + 池回引。
///
/// # 契约说明（What）
/// - 所有数据访问经由 [`Self::memory`] / [`Self::memory_mut`] 的守卫入口，
///   引用计数归零（或槽位已被复用）后任何访问返回 `buffer.released`；
/// - [`Self::retain`] / [`Self::release`] 可被持有副本的多个线程无锁并发
///   调用；归还恰好发生在 1 → 0 的那次 `release` 上。
pub struct PooledMemory {
    memory: Memory,
    slot_id: usize,
    generation: u64,
    pool: Arc<PoolInner>,
}

impl PooledMemory {
    /// 槽位编号。
    #[must_use]
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    /// 当前引用计数（诊断用途；读取后立即可能过期）。
    #[must_use]
    pub fn ref_cnt(&self) -> i64 {
        self.slot().ref_cnt.load(Ordering::Acquire)
    }

    /// 引用计数加一。
    ///
    /// - **错误条件**：缓冲已不在池中时返回 `buffer.released`。
    pub fn retain(&self) -> Result<()> {
        self.retain_n(1)
    }

    /// 引用计数加 `n`。
    pub fn retain_n(&self, n: usize) -> Result<()> {
        self.check_generation()?;
        self.slot()
            .ref_cnt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current <= 0 {
                    None
                } else {
                    current.checked_add(n as i64)
                }
            })
            .map(|_| ())
            .map_err(|_| not_in_pool(self.slot_id))
    }

    /// 引用计数减一；恰好归零时把槽位还给自由链表。
    ///
    /// # 契约说明
    /// - **返回值**：`true` 表示本次调用完成了归还（1 → 0）；
    /// - **错误条件**：对已归零/已复用的缓冲调用返回 `buffer.released`，
    ///   绝不自动恢复。
    pub fn release(&self) -> Result<bool> {
        self.check_generation()?;
        let slot = self.slot();
        let previous = slot
            .ref_cnt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current <= 0 { None } else { Some(current - 1) }
            })
            .map_err(|_| not_in_pool(self.slot_id))?;
        if previous == 1 {
            // 最后一个持有者：推进世代号使陈旧句柄失效，再归还槽位。
            slot.generation.fetch_add(1, Ordering::AcqRel);
            self.pool
                .metrics
                .total_releases
                .fetch_add(1, Ordering::Relaxed);
            self.pool
                .metrics
                .active_leases
                .fetch_sub(1, Ordering::Relaxed);
            self.pool.free.lock().push(self.slot_id);
            return Ok(true);
        }
        Ok(false)
    }

    /// 守卫后的只读访问入口。
    pub fn memory(&self) -> Result<&Memory> {
        self.guard()?;
        Ok(&self.memory)
    }

    /// 守卫后的可写访问入口。
    pub fn memory_mut(&mut self) -> Result<&mut Memory> {
        self.guard()?;
        Ok(&mut self.memory)
    }

    /// 派生一个共享槽位、游标独立的副本（引用计数加一）。
    pub fn duplicate(&self) -> Result<PooledMemory> {
        self.retain()?;
        Ok(PooledMemory {
            memory: self.memory.duplicate(),
            slot_id: self.slot_id,
            generation: self.generation,
            pool: Arc::clone(&self.pool),
        })
    }

    fn slot(&self) -> &Slot {
        &self.pool.slots[self.slot_id]
    }

    fn guard(&self) -> Result<()> {
        self.check_generation()?;
        if self.slot().ref_cnt.load(Ordering::Acquire) <= 0 {
            return Err(not_in_pool(self.slot_id));
        }
        Ok(())
    }

    fn check_generation(&self) -> Result<()> {
        if self.slot().generation.load(Ordering::Acquire) != self.generation {
            return Err(not_in_pool(self.slot_id));
        }
        Ok(())
    }
}

impl core::fmt::Debug for PooledMemory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PooledMemory")
            .field("slot_id", &self.slot_id)
            .field("ref_cnt", &self.ref_cnt())
            .field("memory", &self.memory)
            .finish()
    }
}

fn not_in_pool(slot_id: usize) -> CoreError {
    CoreError::new(
        codes::BUFFER_RELEASED,
        format!("槽位 {slot_id} 的缓冲已不在池中（not in pool）"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sets_logical_capacity_and_refcnt() {
        let pool = MemoryPool::new(2, 64).expect("建池");
        let lease = pool.allocate(16).expect("租借");
        assert_eq!(lease.ref_cnt(), 1);
        let mem = lease.memory().expect("守卫访问");
        assert_eq!(mem.capacity(), 16);
        assert_eq!(mem.max_capacity(), 64);
    }

    #[test]
    fn oversized_allocation_is_rejected() {
        let pool = MemoryPool::new(1, 8).expect("建池");
        let err = pool.allocate(9).expect_err("超过槽位上限必须失败");
        assert_eq!(err.code(), codes::BUFFER_CAPACITY_EXCEEDED);
    }

    #[test]
    fn allocate_with_restores_cursor_state() {
        let pool = MemoryPool::new(1, 64).expect("建池");
        let lease = pool.allocate_with(28, 64, 4, 20).expect("带游标租借");
        let mem = lease.memory().expect("守卫访问");
        assert_eq!(mem.reader_index(), 4);
        assert_eq!(mem.writer_index(), 20);
        assert_eq!(mem.capacity(), 28);
    }

    #[test]
    fn stale_handle_is_rejected_after_slot_reuse() {
        let pool = MemoryPool::new(1, 8).expect("建池");
        let first = pool.allocate(8).expect("首次租借");
        first.release().expect("归还");
        let _second = pool.allocate(8).expect("复用同一槽位");
        let err = first.memory().expect_err("陈旧句柄必须被拒绝");
        assert_eq!(err.code(), codes::BUFFER_RELEASED);
        let err = first.retain().expect_err("陈旧句柄不得 retain");
        assert_eq!(err.code(), codes::BUFFER_RELEASED);
    }
}
