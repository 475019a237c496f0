//! 多字节载入/存储原语与进程级策略选择。
//!
//! # 教案定位（Why）
//! - [`Memory`](crate::Memory) 的类型化访问最终都要落到“在字节序列的某个
//!   偏移处读/写 16/32/64 位整数”这一原语上；
//! - 不同目标平台对非对齐访问的代价不同，因此载入方式做成可替换策略，
//!   并在进程启动后一次性选定、不再变化。
//!
//! # 使用契约（What）
//! - 本层**不做边界检查**：索引合法性由 `Memory` 负责，此处仅保留
//!   `debug_assert` 兜底；
//! - 所有读写均按**本机字节序**进行，大小端转换由 `Memory` 依据自身的
//!   [`ByteOrder`](crate::ByteOrder) 状态完成；
//! - [`accessor`] 首次调用时固化策略；[`select_accessor`] 只在此之前生效，
//!   之后的调用不改变既有选择。
//!
//! # 设计考量（How）
//! - `Unaligned` 策略通过 `ptr::read_unaligned`/`write_unaligned` 直接访问，
//!   适合允许非对齐访问的主流平台；
//! - `Bytewise` 策略先拷贝到栈上数组再组装，任何平台都可用；
//! - 进程级单例由 `spin::Once` 固化，与注册表播种使用同一套原语。

use core::ptr;

use spin::Once;

/// 多字节载入/存储策略。
///
/// # 契约说明（What）
/// - **前置条件**：`index + size_of::<T>() <= bytes.len()`，由调用方
///   （`Memory`）保证；
/// - **字节序**：读写均为本机序，调用方自行转换。
pub trait RawAccessor: Send + Sync {
    /// 读取本机序 u16。
    fn get_u16(&self, bytes: &[u8], index: usize) -> u16;
    /// 读取本机序 u32。
    fn get_u32(&self, bytes: &[u8], index: usize) -> u32;
    /// 读取本机序 u64。
    fn get_u64(&self, bytes: &[u8], index: usize) -> u64;
    /// 写入本机序 u16。
    fn set_u16(&self, bytes: &mut [u8], index: usize, value: u16);
    /// 写入本机序 u32。
    fn set_u32(&self, bytes: &mut [u8], index: usize, value: u32);
    /// 写入本机序 u64。
    fn set_u64(&self, bytes: &mut [u8], index: usize, value: u64);
}

/// 基于非对齐指针访问的快速路径策略。
///
/// # 安全性说明
/// - `read_unaligned`/`write_unaligned` 明确允许任意对齐的地址；
/// - 指针由切片派生且偏移经 `debug_assert` 校验不越界（发布构建中由
///   `Memory` 的边界检查保证），因此访问始终落在切片拥有的内存内。
pub struct UnalignedAccessor;

impl RawAccessor for UnalignedAccessor {
    fn get_u16(&self, bytes: &[u8], index: usize) -> u16 {
        debug_assert!(index + 2 <= bytes.len());
        unsafe { ptr::read_unaligned(bytes.as_ptr().add(index).cast::<u16>()) }
    }

    fn get_u32(&self, bytes: &[u8], index: usize) -> u32 {
        debug_assert!(index + 4 <= bytes.len());
        unsafe { ptr::read_unaligned(bytes.as_ptr().add(index).cast::<u32>()) }
    }

    fn get_u64(&self, bytes: &[u8], index: usize) -> u64 {
        debug_assert!(index + 8 <= bytes.len());
        unsafe { ptr::read_unaligned(bytes.as_ptr().add(index).cast::<u64>()) }
    }

    fn set_u16(&self, bytes: &mut [u8], index: usize, value: u16) {
        debug_assert!(index + 2 <= bytes.len());
        unsafe { ptr::write_unaligned(bytes.as_mut_ptr().add(index).cast::<u16>(), value) }
    }

    fn set_u32(&self, bytes: &mut [u8], index: usize, value: u32) {
        debug_assert!(index + 4 <= bytes.len());
        unsafe { ptr::write_unaligned(bytes.as_mut_ptr().add(index).cast::<u32>(), value) }
    }

    fn set_u64(&self, bytes: &mut [u8], index: usize, value: u64) {
        debug_assert!(index + 8 <= bytes.len());
        unsafe { ptr::write_unaligned(bytes.as_mut_ptr().add(index).cast::<u64>(), value) }
    }
}

/// 逐字节组装的可移植策略。
pub struct BytewiseAccessor;

impl RawAccessor for BytewiseAccessor {
    fn get_u16(&self, bytes: &[u8], index: usize) -> u16 {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(&bytes[index..index + 2]);
        u16::from_ne_bytes(raw)
    }

    fn get_u32(&self, bytes: &[u8], index: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[index..index + 4]);
        u32::from_ne_bytes(raw)
    }

    fn get_u64(&self, bytes: &[u8], index: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[index..index + 8]);
        u64::from_ne_bytes(raw)
    }

    fn set_u16(&self, bytes: &mut [u8], index: usize, value: u16) {
        bytes[index..index + 2].copy_from_slice(&value.to_ne_bytes());
    }

    fn set_u32(&self, bytes: &mut [u8], index: usize, value: u32) {
        bytes[index..index + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn set_u64(&self, bytes: &mut [u8], index: usize, value: u64) {
        bytes[index..index + 8].copy_from_slice(&value.to_ne_bytes());
    }
}

static UNALIGNED: UnalignedAccessor = UnalignedAccessor;
static BYTEWISE: BytewiseAccessor = BytewiseAccessor;
static SELECTED: Once<&'static dyn RawAccessor> = Once::new();

/// 返回进程级载入/存储策略；首次调用时按目标平台固化默认选择。
///
/// # 契约说明
/// - **后置条件**：同一进程内的所有调用返回同一个策略实例；
/// - 默认在 x86/x86_64/aarch64 上选择 [`UnalignedAccessor`]，
///   其余平台选择 [`BytewiseAccessor`]。
#[must_use]
pub fn accessor() -> &'static dyn RawAccessor {
    *SELECTED.call_once(default_accessor)
}

/// 在首次使用前显式指定策略；竞争时以先到者为准，返回最终生效的策略。
pub fn select_accessor(preferred: &'static dyn RawAccessor) -> &'static dyn RawAccessor {
    *SELECTED.call_once(|| preferred)
}

fn default_accessor() -> &'static dyn RawAccessor {
    if cfg!(any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "aarch64"
    )) {
        &UNALIGNED
    } else {
        &BYTEWISE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategies_agree_on_round_trip() {
        let mut buf = [0u8; 16];
        for strategy in [&UNALIGNED as &dyn RawAccessor, &BYTEWISE] {
            strategy.set_u16(&mut buf, 1, 0xA1B2);
            assert_eq!(strategy.get_u16(&buf, 1), 0xA1B2);
            strategy.set_u32(&mut buf, 3, 0xDEAD_BEEF);
            assert_eq!(strategy.get_u32(&buf, 3), 0xDEAD_BEEF);
            strategy.set_u64(&mut buf, 7, 0x0102_0304_0506_0708);
            assert_eq!(strategy.get_u64(&buf, 7), 0x0102_0304_0506_0708);
        }
    }

    #[test]
    fn process_wide_selection_is_sticky() {
        let first = accessor();
        let second = select_accessor(&BYTEWISE);
        assert!(core::ptr::eq(first, second), "策略一经固化不得更换");
    }
}
