#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-codecs
//!
//! ## 教案目的（Why）
//! - **定位**：所有具体协议编解码共享的通用形状：头部视图、构建器、
//!   载荷链与按协议号派发的解码注册表，外加 Internet 校验和工具。
//! - **架构角色**：`tap-codec-arp`/`tap-codec-ip`/`tap-codec-icmp`
//!   只依赖本 crate 的契约互相链接，彼此之间不存在编译期依赖——
//!   链式解析在运行期经 [`Dispatcher`] 完成。
//! - **设计策略**：对象层只保留一个 object-safe 的 [`PacketView`]，
//!   字段级强类型访问留给各 codec 的具体结构；继承层次被压平为
//!   “共享字段结构 + 组合”。
//!
//! ## 交互契约（What）
//! - [`Payload`] 构成单链：`Decoded` 指向下一层报文，`Opaque` 保留
//!   未识别/终端字节，`None` 表示链终止；
//! - [`Dispatcher::decode`] 查不到协议号时返回 `Opaque` 而非错误，
//!   保证解析链不因未知号而断裂；
//! - [`checksum`] 的全部入口都以“校验字段按零参与求和”的方式计算，
//!   与 RFC 1071 的一补数折叠语义一致。

extern crate alloc;

pub mod checksum;
pub mod dispatch;
pub mod net;
pub mod packet;

pub use dispatch::{DecodeFn, Dispatcher, ETHER_DISPATCH, IP_DISPATCH};
pub use net::{MacAddress, MacParseError};
pub use packet::{Header, PacketBuilder, PacketView, Payload, find_layer};
