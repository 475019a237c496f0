//! 按协议号派发下一层解码器的运行期注册表。
//!
//! # 教案定位（Why）
//! - 链式解析的“下一层由头部字段决定”必须在运行期完成：各 codec crate
//!   之间不存在编译期依赖，只在初始化时把自己的解码函数注册进来；
//! - 未注册的协议号不是错误：载荷以 [`Payload::Opaque`] 原样保留，
//!   解析链照常终止——`UNKNOWN` 哨兵语义的派发侧表达。
//!
//! # 核心机制（How）
//! - 表项为 `(键, 函数指针)` 的向量，读多写少，由 `spin::RwLock` 守护；
//! - `register` 对同键覆盖，与名称注册表的覆盖语义一致；
//! - 进程级共享表以 `static` 暴露（[`IP_DISPATCH`]/[`ETHER_DISPATCH`]），
//!   各 codec crate 的 `register_defaults` 在初始化阶段写入。

use alloc::boxed::Box;
use alloc::vec::Vec;

use spin::RwLock;

use tap_buffer::Memory;
use tap_core::{EtherType, ProtocolId, Result};

use crate::packet::{PacketView, Payload};

/// 解码函数：消费载荷缓冲，产出下一层报文视图。
pub type DecodeFn = fn(&mut Memory) -> Result<Box<dyn PacketView>>;

/// 协议号 → 解码函数的运行期注册表。
///
/// # 契约说明（What）
/// - **前置条件**：键类型可比较、可复制；
/// - **后置条件**：[`Self::decode`] 对任何键都成功返回载荷形态
///   （空载荷 → `None`，未注册 → `Opaque`，已注册 → `Decoded` 或
///   解码器自身的错误）。
pub struct Dispatcher<K> {
    entries: RwLock<Vec<(K, DecodeFn)>>,
}

impl<K: Copy + Eq> Dispatcher<K> {
    /// 创建空注册表；`const` 以便声明为进程级 `static`。
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 注册（或覆盖）一个解码器。
    pub fn register(&self, key: K, decode: DecodeFn) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.iter_mut().find(|(existing, _)| *existing == key) {
            entry.1 = decode;
        } else {
            entries.push((key, decode));
        }
    }

    /// 查询解码器。
    #[must_use]
    pub fn lookup(&self, key: K) -> Option<DecodeFn> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| *existing == key)
            .map(|(_, decode)| *decode)
    }

    /// 对载荷缓冲执行派发解码。
    ///
    /// # 契约说明
    /// - 载荷无可读字节 → [`Payload::None`]；
    /// - 键未注册 → [`Payload::Opaque`]（保留原缓冲，链不断裂）；
    /// - 键已注册 → 解码成功得到 [`Payload::Decoded`]，解码器报告的
    ///   格式错误原样向上传播。
    pub fn decode(&self, key: K, mut payload: Memory) -> Result<Payload> {
        if payload.readable_bytes() == 0 {
            return Ok(Payload::None);
        }
        match self.lookup(key) {
            Some(decode) => decode(&mut payload).map(Payload::Decoded),
            None => Ok(Payload::Opaque(payload)),
        }
    }
}

impl<K: Copy + Eq> Default for Dispatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// IPv4 protocol / IPv6 next-header 链的进程级派发表。
pub static IP_DISPATCH: Dispatcher<ProtocolId> = Dispatcher::new();

/// 以太网帧类型链的进程级派发表。
pub static ETHER_DISPATCH: Dispatcher<EtherType> = Dispatcher::new();

#[cfg(test)]
mod tests {
    use super::*;
    use core::any::Any;

    #[derive(Debug)]
    struct Stub {
        value: u8,
        payload: Payload,
    }

    impl PacketView for Stub {
        fn header_length(&self) -> usize {
            1
        }
        fn payload(&self) -> &Payload {
            &self.payload
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn decode_stub(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
        Ok(Box::new(Stub {
            value: memory.read_u8()?,
            payload: Payload::None,
        }))
    }

    #[test]
    fn unknown_key_keeps_payload_opaque() {
        let dispatcher: Dispatcher<ProtocolId> = Dispatcher::new();
        let payload = Memory::from_slice(&[1, 2, 3]);
        let decoded = dispatcher
            .decode(ProtocolId::Other(200), payload)
            .expect("未知协议号不得报错");
        let opaque = decoded.as_opaque().expect("应保留原始载荷");
        assert_eq!(opaque.readable_bytes(), 3);
    }

    #[test]
    fn empty_payload_terminates_chain() {
        let dispatcher: Dispatcher<ProtocolId> = Dispatcher::new();
        let decoded = dispatcher
            .decode(ProtocolId::Udp, Memory::from_slice(&[]))
            .expect("空载荷不得报错");
        assert!(decoded.is_none());
    }

    #[test]
    fn registered_decoder_is_invoked_and_overridable() {
        let dispatcher: Dispatcher<ProtocolId> = Dispatcher::new();
        dispatcher.register(ProtocolId::Udp, decode_stub);
        let decoded = dispatcher
            .decode(ProtocolId::Udp, Memory::from_slice(&[0x2A]))
            .expect("解码成功");
        let stub = decoded.find::<Stub>().expect("应得到桩报文");
        assert_eq!(stub.value, 0x2A);
        // 覆盖注册生效。
        dispatcher.register(ProtocolId::Udp, |memory| {
            memory.skip_bytes(memory.readable_bytes())?;
            Ok(Box::new(Stub {
                value: 0xFF,
                payload: Payload::None,
            }))
        });
        let decoded = dispatcher
            .decode(ProtocolId::Udp, Memory::from_slice(&[0x2A]))
            .expect("解码成功");
        assert_eq!(decoded.find::<Stub>().expect("桩报文").value, 0xFF);
    }
}
