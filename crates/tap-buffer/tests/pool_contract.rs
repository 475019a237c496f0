//! `pool_contract` 集成测试：验证 `MemoryPool` 的引用计数纪律与
//! 快速失败策略在公开 API 下的契约执行情况。
//!
//! # 测试目标（Why）
//! - “不在池中即拒绝”是池的首要正确性不变量：双重释放、释放后访问、
//!   释放后 retain 必须全部立即失败；
//! - 池耗尽的 `allocate` 必须立即失败而非等待，这是既定策略而非缺陷；
//! - 归还后的槽位必须重新可用，统计快照须如实反映生命周期。

use tap_buffer::MemoryPool;
use tap_core::codes;

/// 容量为 N 的池：第 N+1 次未归还的租借必须快速失败。
#[test]
fn exhausted_pool_fails_fast() {
    let pool = MemoryPool::new(2, 32).expect("建池");
    let first = pool.allocate(8).expect("第 1 次租借");
    let _second = pool.allocate(8).expect("第 2 次租借");
    let err = pool.allocate(8).expect_err("第 3 次租借必须立即失败");
    assert_eq!(err.code(), codes::BUFFER_POOL_EXHAUSTED);
    // 归还一个后，同一槽位重新可用。
    assert!(first.release().expect("归还"), "1 → 0 的释放应完成归还");
    let reused = pool.allocate(8).expect("归还后应能再次租借");
    assert_eq!(reused.slot_id(), first.slot_id(), "应复用刚归还的槽位");
}

/// 释放引用计数为 1 的缓冲成功；对已归零缓冲的释放与访问全部失败。
#[test]
fn release_discipline_is_enforced() {
    let pool = MemoryPool::new(1, 16).expect("建池");
    let lease = pool.allocate(16).expect("租借");
    assert!(lease.release().expect("首次释放成功"));
    let err = lease.release().expect_err("双重释放必须失败");
    assert_eq!(err.code(), codes::BUFFER_RELEASED);
    let err = lease.memory().expect_err("释放后访问必须失败");
    assert_eq!(err.code(), codes::BUFFER_RELEASED);
    let err = lease.retain().expect_err("释放后 retain 必须失败");
    assert_eq!(err.code(), codes::BUFFER_RELEASED);
}

/// retain 之后需要等量的 release 才会真正归还槽位。
#[test]
fn retain_defers_slot_return() {
    let pool = MemoryPool::new(1, 16).expect("建池");
    let lease = pool.allocate(4).expect("租借");
    lease.retain().expect("引用计数加一");
    assert_eq!(lease.ref_cnt(), 2);
    assert!(!lease.release().expect("2 → 1 不归还"), "仍有持有者时不得归还");
    assert!(
        pool.allocate(4).is_err(),
        "槽位尚未归还，新的租借必须失败"
    );
    assert!(lease.release().expect("1 → 0 完成归还"));
    assert!(pool.allocate(4).is_ok(), "归还后槽位重新可用");
}

/// 副本共享引用计数：每个副本的释放都计入同一槽位。
#[test]
fn duplicates_share_the_slot_refcount() {
    let pool = MemoryPool::new(1, 16).expect("建池");
    let lease = pool.allocate(8).expect("租借");
    let twin = lease.duplicate().expect("派生副本");
    assert_eq!(lease.ref_cnt(), 2, "副本派生应使引用计数加一");
    assert!(!twin.release().expect("副本先释放"));
    assert!(lease.release().expect("最后的持有者完成归还"));
    assert!(twin.memory().is_err(), "归还后副本也不得再访问");
}

/// 池化缓冲走通基准游标场景：写两个 int、重置读游标、读尽。
#[test]
fn pooled_memory_supports_cursor_round_trip() {
    let pool = MemoryPool::new(1, 8).expect("建池");
    let mut lease = pool.allocate(8).expect("租借 8 字节");
    {
        let mem = lease.memory_mut().expect("守卫访问");
        mem.write_i32(1).expect("写入首个 int");
        mem.write_i32(2).expect("写入第二个 int");
        mem.set_reader_index(0).expect("重置读游标");
        assert_eq!(mem.read_i32().expect("读取首个 int"), 1);
        assert_eq!(mem.read_i32().expect("读取第二个 int"), 2);
        assert!(!mem.is_readable());
    }
    lease.release().expect("归还");
}

/// `allocate_with` 重建指定的容量与游标状态。
#[test]
fn allocate_with_rematerializes_cursors() {
    let pool = MemoryPool::new(1, 64).expect("建池");
    let lease = pool.allocate_with(28, 64, 0, 28).expect("重建游标状态");
    let mem = lease.memory().expect("守卫访问");
    assert_eq!(mem.capacity(), 28);
    assert_eq!(mem.writer_index(), 28);
    assert_eq!(mem.readable_bytes(), 28);
}

/// 统计快照如实跟踪分配、归还与快速失败。
#[test]
fn stats_track_pool_lifecycle() {
    let pool = MemoryPool::new(1, 16).expect("建池");
    let initial = pool.stats();
    assert_eq!(initial.free_slots, 1);
    assert_eq!(initial.total_allocations, 0);

    let lease = pool.allocate(8).expect("租借");
    let during = pool.stats();
    assert_eq!(during.free_slots, 0);
    assert_eq!(during.active_leases, 1);
    assert_eq!(during.total_allocations, 1);

    assert!(pool.allocate(8).is_err(), "耗尽时快速失败");
    assert_eq!(pool.stats().failed_allocations, 1);

    lease.release().expect("归还");
    let after = pool.stats();
    assert_eq!(after.free_slots, 1);
    assert_eq!(after.active_leases, 0);
    assert_eq!(after.total_releases, 1);
}
