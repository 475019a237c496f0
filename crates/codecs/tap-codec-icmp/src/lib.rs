#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-codec-icmp
//!
//! ## 教案目的（Why）
//! - **定位**：ICMPv4（RFC 792）与 ICMPv6（RFC 4443）编解码，
//!   含类型-代码目录与邻居发现（RFC 4861）消息及其 TLV 选项。
//! - **架构角色**：协议号派发表中 `Icmp`/`Icmpv6` 的解码入口；
//!   目录负责把 `(type, code)` 翻译为可读名称，运行期开放注册。
//!
//! ## 交互契约（What）
//! - 目录查询永不失败，未登记组合解析为 `UNKNOWN` 哨兵；
//! - NDP TLV 选项解析遵循**截断停止策略**：声明长度为 0 或载荷超出
//!   剩余缓冲时就地停止、返回已累积选项，绝不报错——该策略以测试
//!   锁定，不得“修复”；
//! - ICMPv4 校验和覆盖整条消息；ICMPv6 另可纳入 IPv6 伪头部。

extern crate alloc;

pub mod catalog;
pub mod ndp;
pub mod v4;
pub mod v6;

pub use catalog::{icmp4_name, icmp6_name, register_icmp4, register_icmp6};
pub use ndp::{NdpOption, PrefixInformation, options_wire_length, parse_options, write_options};
pub use v4::{ICMP4_HEADER_LEN, Icmp4Builder, Icmp4Header, Icmp4Packet};
pub use v6::{ICMP6_HEADER_LEN, Icmp6Body, Icmp6Builder, Icmp6Header, Icmp6Packet};

use tap_core::ProtocolId;
use tap_codecs::{Dispatcher, IP_DISPATCH};

/// 把 ICMPv4/ICMPv6 解码器注册进指定的协议号派发表。
pub fn register_next_header(dispatcher: &Dispatcher<ProtocolId>) {
    dispatcher.register(ProtocolId::Icmp, v4::decode);
    dispatcher.register(ProtocolId::Icmpv6, v6::decode);
}

/// 把本 crate 的全部解码器注册进进程级派发表。
pub fn register_defaults() {
    register_next_header(&IP_DISPATCH);
}
