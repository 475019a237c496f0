//! 报文、头部与构建器的通用契约。
//!
//! # 教案定位（Why）
//! - 每个协议编解码都有同样的三件套：定长前缀之上的**头部视图**、
//!   产出或改写它的**构建器**、指向下一层协议的**载荷链**；
//! - 把这组形状固定在对象安全的最小接口上，上层（诊断输出、逐层查找）
//!   可以对任意协议栈统一遍历，而无需知道具体类型。
//!
//! # 使用契约（What）
//! - [`Header::to_memory`] 是显式的“计算规范缓冲”入口：每次调用返回
//!   独立的缓冲，不存在隐藏的惰性初始化状态；
//! - [`PacketBuilder::parse`] 以游标相对读取消费定长前缀，剩余可读字节
//!   成为载荷子视图；[`PacketBuilder::reset_at`] 把字段逐字节写回**既有**
//!   的后备缓冲，不重新分配；
//! - [`find_layer`] 沿载荷链按具体类型查找（链式 `as_any` 下钻）。

use alloc::boxed::Box;
use core::any::Any;
use core::fmt;

use tap_buffer::Memory;
use tap_core::Result;

/// 协议头部视图的公共能力。
pub trait Header {
    /// 本头部的线缆长度（字节）。
    fn length(&self) -> usize;

    /// 计算并返回规范的线缆缓冲。
    ///
    /// # 契约说明
    /// - **后置条件**：返回的缓冲拥有独立游标，`readable_bytes()` 等于
    ///   [`Self::length`]；对返回值的修改不影响头部自身；
    /// - 每次调用重新计算，无缓存状态。
    fn to_memory(&self) -> Result<Memory>;
}

/// 对象安全的报文视图：供跨协议遍历与诊断输出使用。
pub trait PacketView: fmt::Debug + 'static {
    /// 本层头部的线缆长度。
    fn header_length(&self) -> usize;

    /// 下一层载荷。
    fn payload(&self) -> &Payload;

    /// 类型下钻入口，供 [`find_layer`] 使用。
    fn as_any(&self) -> &dyn Any;
}

/// 载荷链节点。
///
/// - `None`：链终止（无载荷字节）；
/// - `Opaque`：存在载荷字节，但协议号未注册或本就是终端数据；
/// - `Decoded`：已按注册的解码器展开为下一层报文。
#[derive(Debug)]
pub enum Payload {
    /// 无载荷。
    None,
    /// 未解码的原始载荷字节。
    Opaque(Memory),
    /// 已解码的下一层报文。
    Decoded(Box<dyn PacketView>),
}

impl Payload {
    /// 是否为空载荷。
    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// 以原始字节视图返回载荷（仅 `Opaque`）。
    #[must_use]
    pub fn as_opaque(&self) -> Option<&Memory> {
        match self {
            Self::Opaque(memory) => Some(memory),
            _ => None,
        }
    }

    /// 以报文视图返回载荷（仅 `Decoded`）。
    #[must_use]
    pub fn as_decoded(&self) -> Option<&dyn PacketView> {
        match self {
            Self::Decoded(packet) => Some(packet.as_ref()),
            _ => None,
        }
    }

    /// 沿链按具体类型查找下一层（含更深层）报文。
    #[must_use]
    pub fn find<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Decoded(packet) => find_layer(packet.as_ref()),
            _ => None,
        }
    }
}

/// 从 `packet` 本层开始沿载荷链查找类型为 `T` 的报文层。
#[must_use]
pub fn find_layer<T: 'static>(packet: &dyn PacketView) -> Option<&T> {
    if let Some(found) = packet.as_any().downcast_ref::<T>() {
        return Some(found);
    }
    packet.payload().find::<T>()
}

/// 构建器契约：每个协议编解码的两条构造路径与原地重写。
///
/// # 契约说明（What）
/// - [`Self::build`]：由调用方提供全部字段，产出报文与规范缓冲；
///   必填字段缺失返回 `protocol.missing_field`；
/// - [`Self::parse`]：游标相对读取线缆字节；剩余可读字节构成载荷
///   子视图，交由派发注册表选择下一层解码器；
/// - [`Self::reset`] / [`Self::reset_at`]：校验字段完备后，把字段
///   逐字节写回构建器携带的既有后备缓冲（默认从偏移 0 写本头部的
///   定长前缀），**不重新分配**；随后可再次 `build` 获得新视图。
pub trait PacketBuilder {
    /// 构建产物（报文类型）。
    type Packet;

    /// 由字段构造全新报文。
    fn build(&self) -> Result<Self::Packet>;

    /// 从线缆字节解析报文。
    fn parse(buffer: &mut Memory) -> Result<Self::Packet>
    where
        Self: Sized;

    /// 将字段写回后备缓冲的默认区间（偏移 0、本头部定长）。
    fn reset(&mut self) -> Result<()>;

    /// 将字段写回后备缓冲的指定区间。
    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()>;
}
