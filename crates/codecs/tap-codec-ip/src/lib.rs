#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-codec-ip
//!
//! ## 教案目的（Why）
//! - **定位**：IPv4（RFC 791）、IPv6（RFC 8200）与 IPv6 扩展头
//!   （Hop-by-Hop / Destination Options / Routing / Fragment /
//!   Authentication）的编解码。
//! - **架构角色**：网络层是链式解析的中枢——IPv4 的 `protocol` 与
//!   IPv6 的 `next_header` 决定下一层解码器，扩展头自身也通过同一张
//!   派发表串联，直至传输层或不透明载荷。
//!
//! ## 交互契约（What）
//! - IPv4 头部校验和遵循 RFC 1071：`calculate_checksum(true)` 时由
//!   `build`/`reset` 计算写入，`is_valid_checksum` 重算比对；
//! - 扩展头总长按 `8 × (extension_length + 1)` 计算（Authentication
//!   例外，按 `(payload_length + 2) × 4`），构建与解析两条路径共用同
//!   一公式；
//! - 所有“下一层”派发经 [`tap_codecs::IP_DISPATCH`] 完成，未注册的
//!   协议号保留为不透明载荷。
//!
//! ## 实现策略（How）
//! - 扩展头的公共字段压平为按值嵌入的
//!   [`ExtensionFields`](extension::ExtensionFields)，不存在继承层次；
//! - 初始化时调用 [`register_defaults`] 把本 crate 的解码器写入
//!   进程级派发表。

extern crate alloc;

pub mod extension;
pub mod v4;
pub mod v6;

pub use extension::{
    AuthenticationBuilder, AuthenticationHeader, AuthenticationPacket, DestinationOptionsBuilder,
    DestinationOptionsHeader, DestinationOptionsPacket, ExtensionFields, FragmentBuilder,
    FragmentHeader, FragmentPacket, HopByHopOptionsBuilder, HopByHopOptionsHeader,
    HopByHopOptionsPacket, RoutingBuilder, RoutingHeader, RoutingPacket,
};
pub use v4::{IPV4_MIN_HEADER_LEN, Ipv4Builder, Ipv4Header, Ipv4Packet};
pub use v6::{IPV6_HEADER_LEN, Ipv6Builder, Ipv6Header, Ipv6Packet};

use tap_core::{EtherType, ProtocolId};
use tap_codecs::{Dispatcher, ETHER_DISPATCH, IP_DISPATCH};

/// 把 IPv4/IPv6 解码器注册进指定的链路层派发表。
pub fn register_ether(dispatcher: &Dispatcher<EtherType>) {
    dispatcher.register(EtherType::Ipv4, v4::decode);
    dispatcher.register(EtherType::Ipv6, v6::decode);
}

/// 把 IPv6 封装与全部扩展头解码器注册进指定的协议号派发表。
pub fn register_next_header(dispatcher: &Dispatcher<ProtocolId>) {
    dispatcher.register(ProtocolId::Ipv6, v6::decode);
    dispatcher.register(ProtocolId::HopByHopOptions, extension::decode_hop_by_hop);
    dispatcher.register(ProtocolId::DestinationOptions, extension::decode_destination);
    dispatcher.register(ProtocolId::Routing, extension::decode_routing);
    dispatcher.register(ProtocolId::Fragment, extension::decode_fragment);
    dispatcher.register(ProtocolId::Authentication, extension::decode_authentication);
}

/// 把本 crate 的全部解码器注册进进程级派发表。
pub fn register_defaults() {
    register_ether(&ETHER_DISPATCH);
    register_next_header(&IP_DISPATCH);
}
