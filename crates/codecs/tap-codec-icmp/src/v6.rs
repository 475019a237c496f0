//! ICMPv6 与邻居发现消息编解码（RFC 4443，RFC 4861）。
//!
//! # 教案定位（Why）
//! - ICMPv6 固定前缀仅 4 字节，复杂度在消息体：邻居发现五种消息
//!   （RS/RA/NS/NA/Redirect）各有定长字段，尾随 TLV 选项列表
//!   （见 [`crate::ndp`]）；
//! - 校验和覆盖整条消息并纳入 IPv6 伪头部；伪头部参数由调用方提供，
//!   缺省时按“仅消息体”口径计算，便于在脱离 IP 层的单元测试中使用。
//!
//! # 使用契约（What）
//! - [`Icmp6Builder::message`] 给定消息体后类型号自动导出；
//!   [`Icmp6Body::Raw`] 形态必须显式指定类型号；
//! - 选项解析遵循截断停止策略：坏条目之后的字节保留为不透明载荷，
//!   不报错。

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::any::Any;
use core::net::Ipv6Addr;

use tap_buffer::Memory;
use tap_core::{CoreError, ProtocolId, Result, codes};
use tap_codecs::checksum::{accumulate, finalize, pseudo_header_v6};
use tap_codecs::net::{read_ipv6, write_ipv6};
use tap_codecs::{PacketBuilder, PacketView, Payload};

use crate::ndp::{NdpOption, options_wire_length, parse_options, write_options};

/// ICMPv6 固定前缀长度（字节）。
pub const ICMP6_HEADER_LEN: usize = 4;

/// Router Solicitation 类型号。
pub const TYPE_ROUTER_SOLICITATION: u8 = 133;
/// Router Advertisement 类型号。
pub const TYPE_ROUTER_ADVERTISEMENT: u8 = 134;
/// Neighbor Solicitation 类型号。
pub const TYPE_NEIGHBOR_SOLICITATION: u8 = 135;
/// Neighbor Advertisement 类型号。
pub const TYPE_NEIGHBOR_ADVERTISEMENT: u8 = 136;
/// Redirect 类型号。
pub const TYPE_REDIRECT: u8 = 137;

/// 头部内校验和字段的偏移。
const CHECKSUM_OFFSET: usize = 2;

pub(crate) fn decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(Icmp6Builder::parse(memory)?))
}

/// ICMPv6 固定前缀字段。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Icmp6Header {
    /// 消息类型。
    pub icmp_type: u8,
    /// 消息代码。
    pub code: u8,
    /// 消息校验和（覆盖伪头部与整条消息）。
    pub checksum: u16,
}

/// ICMPv6 消息体。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Icmp6Body {
    /// Router Solicitation（133）。
    RouterSolicitation {
        /// TLV 选项列表。
        options: Vec<NdpOption>,
    },
    /// Router Advertisement（134）。
    RouterAdvertisement {
        /// 建议的跳数上限。
        current_hop_limit: u8,
        /// Managed 地址配置标志（M）。
        managed: bool,
        /// Other 配置标志（O）。
        other: bool,
        /// 路由器生存期（秒）。
        router_lifetime: u16,
        /// 可达时间（毫秒）。
        reachable_time: u32,
        /// 重传间隔（毫秒）。
        retrans_timer: u32,
        /// TLV 选项列表。
        options: Vec<NdpOption>,
    },
    /// Neighbor Solicitation（135）。
    NeighborSolicitation {
        /// 被询问的目标地址。
        target: Ipv6Addr,
        /// TLV 选项列表。
        options: Vec<NdpOption>,
    },
    /// Neighbor Advertisement（136）。
    NeighborAdvertisement {
        /// Router 标志（R）。
        router: bool,
        /// Solicited 标志（S）。
        solicited: bool,
        /// Override 标志（O）。
        override_flag: bool,
        /// 通告的目标地址。
        target: Ipv6Addr,
        /// TLV 选项列表。
        options: Vec<NdpOption>,
    },
    /// Redirect（137）。
    Redirect {
        /// 更优下一跳地址。
        target: Ipv6Addr,
        /// 触发重定向的目的地址。
        destination: Ipv6Addr,
        /// TLV 选项列表。
        options: Vec<NdpOption>,
    },
    /// 非邻居发现消息的原始消息体。
    Raw(Vec<u8>),
}

impl Icmp6Body {
    /// 消息体对应的类型号；`Raw` 形态没有固有类型号。
    #[must_use]
    pub fn derived_type(&self) -> Option<u8> {
        match self {
            Self::RouterSolicitation { .. } => Some(TYPE_ROUTER_SOLICITATION),
            Self::RouterAdvertisement { .. } => Some(TYPE_ROUTER_ADVERTISEMENT),
            Self::NeighborSolicitation { .. } => Some(TYPE_NEIGHBOR_SOLICITATION),
            Self::NeighborAdvertisement { .. } => Some(TYPE_NEIGHBOR_ADVERTISEMENT),
            Self::Redirect { .. } => Some(TYPE_REDIRECT),
            Self::Raw(_) => None,
        }
    }

    /// 消息体内的 TLV 选项列表（`Raw` 形态为空）。
    #[must_use]
    pub fn options(&self) -> &[NdpOption] {
        match self {
            Self::RouterSolicitation { options }
            | Self::RouterAdvertisement { options, .. }
            | Self::NeighborSolicitation { options, .. }
            | Self::NeighborAdvertisement { options, .. }
            | Self::Redirect { options, .. } => options,
            Self::Raw(_) => &[],
        }
    }

    /// 消息体的线缆长度。
    pub fn wire_length(&self) -> Result<usize> {
        Ok(match self {
            Self::RouterSolicitation { options } => 4 + options_wire_length(options)?,
            Self::RouterAdvertisement { options, .. } => 12 + options_wire_length(options)?,
            Self::NeighborSolicitation { options, .. }
            | Self::NeighborAdvertisement { options, .. } => 20 + options_wire_length(options)?,
            Self::Redirect { options, .. } => 36 + options_wire_length(options)?,
            Self::Raw(data) => data.len(),
        })
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        match self {
            Self::RouterSolicitation { options } => {
                memory.write_u32(0)?;
                write_options(memory, options)
            }
            Self::RouterAdvertisement {
                current_hop_limit,
                managed,
                other,
                router_lifetime,
                reachable_time,
                retrans_timer,
                options,
            } => {
                memory.write_u8(*current_hop_limit)?;
                memory.write_u8((u8::from(*managed) << 7) | (u8::from(*other) << 6))?;
                memory.write_u16(*router_lifetime)?;
                memory.write_u32(*reachable_time)?;
                memory.write_u32(*retrans_timer)?;
                write_options(memory, options)
            }
            Self::NeighborSolicitation { target, options } => {
                memory.write_u32(0)?;
                write_ipv6(memory, target)?;
                write_options(memory, options)
            }
            Self::NeighborAdvertisement {
                router,
                solicited,
                override_flag,
                target,
                options,
            } => {
                let flags = (u32::from(*router) << 31)
                    | (u32::from(*solicited) << 30)
                    | (u32::from(*override_flag) << 29);
                memory.write_u32(flags)?;
                write_ipv6(memory, target)?;
                write_options(memory, options)
            }
            Self::Redirect {
                target,
                destination,
                options,
            } => {
                memory.write_u32(0)?;
                write_ipv6(memory, target)?;
                write_ipv6(memory, destination)?;
                write_options(memory, options)
            }
            Self::Raw(data) => memory.write_bytes(data),
        }
    }

    fn parse(icmp_type: u8, buffer: &mut Memory) -> Result<Self> {
        match icmp_type {
            TYPE_ROUTER_SOLICITATION => {
                ensure_body(buffer, 4, "Router Solicitation")?;
                buffer.skip_bytes(4)?;
                Ok(Self::RouterSolicitation {
                    options: parse_options(buffer),
                })
            }
            TYPE_ROUTER_ADVERTISEMENT => {
                ensure_body(buffer, 12, "Router Advertisement")?;
                let current_hop_limit = buffer.read_u8()?;
                let flags = buffer.read_u8()?;
                let router_lifetime = buffer.read_u16()?;
                let reachable_time = buffer.read_u32()?;
                let retrans_timer = buffer.read_u32()?;
                Ok(Self::RouterAdvertisement {
                    current_hop_limit,
                    managed: flags & 0x80 != 0,
                    other: flags & 0x40 != 0,
                    router_lifetime,
                    reachable_time,
                    retrans_timer,
                    options: parse_options(buffer),
                })
            }
            TYPE_NEIGHBOR_SOLICITATION => {
                ensure_body(buffer, 20, "Neighbor Solicitation")?;
                buffer.skip_bytes(4)?;
                let target = read_ipv6(buffer)?;
                Ok(Self::NeighborSolicitation {
                    target,
                    options: parse_options(buffer),
                })
            }
            TYPE_NEIGHBOR_ADVERTISEMENT => {
                ensure_body(buffer, 20, "Neighbor Advertisement")?;
                let flags = buffer.read_u32()?;
                let target = read_ipv6(buffer)?;
                Ok(Self::NeighborAdvertisement {
                    router: flags & 0x8000_0000 != 0,
                    solicited: flags & 0x4000_0000 != 0,
                    override_flag: flags & 0x2000_0000 != 0,
                    target,
                    options: parse_options(buffer),
                })
            }
            TYPE_REDIRECT => {
                ensure_body(buffer, 36, "Redirect")?;
                buffer.skip_bytes(4)?;
                let target = read_ipv6(buffer)?;
                let destination = read_ipv6(buffer)?;
                Ok(Self::Redirect {
                    target,
                    destination,
                    options: parse_options(buffer),
                })
            }
            _ => {
                let mut data = alloc::vec![0u8; buffer.readable_bytes()];
                buffer.read_bytes(&mut data)?;
                Ok(Self::Raw(data))
            }
        }
    }
}

fn ensure_body(buffer: &Memory, needed: usize, label: &'static str) -> Result<()> {
    if buffer.readable_bytes() < needed {
        return Err(CoreError::new(
            codes::PROTOCOL_DECODE,
            format!(
                "{label} 消息体不足 {needed} 字节（剩余 {}）",
                buffer.readable_bytes()
            ),
        ));
    }
    Ok(())
}

/// ICMPv6 报文：固定前缀 + 消息体 + 截断残留。
#[derive(Debug)]
pub struct Icmp6Packet {
    header: Icmp6Header,
    body: Icmp6Body,
    payload: Payload,
    backing: Option<Memory>,
}

impl Icmp6Packet {
    /// 固定前缀视图。
    #[must_use]
    pub fn header(&self) -> &Icmp6Header {
        &self.header
    }

    /// 消息体。
    #[must_use]
    pub fn body(&self) -> &Icmp6Body {
        &self.body
    }

    /// 返回预填充且携带后备缓冲的构建器。
    #[must_use]
    pub fn builder(&self) -> Icmp6Builder {
        Icmp6Builder {
            icmp_type: Some(self.header.icmp_type),
            code: self.header.code,
            checksum: Some(self.header.checksum),
            calculate_checksum: false,
            body: Some(self.body.clone()),
            pseudo_header: None,
            backing: self.backing.as_ref().map(Memory::duplicate),
        }
    }

    /// 整条消息的线缆长度。
    pub fn wire_length(&self) -> Result<usize> {
        Ok(ICMP6_HEADER_LEN + self.body.wire_length()?)
    }

    /// 导出整条消息的线缆缓冲。
    pub fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(self.wire_length()?);
        memory.write_u8(self.header.icmp_type)?;
        memory.write_u8(self.header.code)?;
        memory.write_u16(self.header.checksum)?;
        self.body.write_into(&mut memory)?;
        Ok(memory)
    }

    /// 重算校验和并与存量比对；`pseudo` 提供 IPv6 伪头部参数。
    pub fn is_valid_checksum(&self, pseudo: Option<(&Ipv6Addr, &Ipv6Addr)>) -> Result<bool> {
        let bytes = self.to_memory()?.readable_to_vec();
        Ok(message_checksum(&bytes, pseudo) == self.header.checksum)
    }
}

impl PacketView for Icmp6Packet {
    fn header_length(&self) -> usize {
        ICMP6_HEADER_LEN
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn message_checksum(message: &[u8], pseudo: Option<(&Ipv6Addr, &Ipv6Addr)>) -> u16 {
    let initial = pseudo.map_or(0, |(src, dst)| {
        pseudo_header_v6(src, dst, message.len() as u32, ProtocolId::Icmpv6)
    });
    finalize(accumulate(initial, message, Some(CHECKSUM_OFFSET)))
}

/// ICMPv6 构建器。
#[derive(Debug, Clone, Default)]
pub struct Icmp6Builder {
    icmp_type: Option<u8>,
    code: u8,
    checksum: Option<u16>,
    calculate_checksum: bool,
    body: Option<Icmp6Body>,
    pseudo_header: Option<(Ipv6Addr, Ipv6Addr)>,
    backing: Option<Memory>,
}

impl Icmp6Builder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 显式指定消息类型（`Raw` 消息体必需；其余形态可省略）。
    #[must_use]
    pub fn icmp_type(mut self, icmp_type: u8) -> Self {
        self.icmp_type = Some(icmp_type);
        self
    }

    /// 指定消息代码。
    #[must_use]
    pub fn code(mut self, code: u8) -> Self {
        self.code = code;
        self
    }

    /// 指定调用方提供的校验和（与 [`Self::calculate_checksum`] 互斥生效）。
    #[must_use]
    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// 置位后 `build`/`reset` 计算并写入校验和。
    #[must_use]
    pub fn calculate_checksum(mut self, calculate: bool) -> Self {
        self.calculate_checksum = calculate;
        self
    }

    /// 指定消息体。
    #[must_use]
    pub fn message(mut self, body: Icmp6Body) -> Self {
        self.body = Some(body);
        self
    }

    /// 提供 IPv6 伪头部参数，使校验和覆盖源/目的地址与长度。
    #[must_use]
    pub fn pseudo_header(mut self, source: Ipv6Addr, destination: Ipv6Addr) -> Self {
        self.pseudo_header = Some((source, destination));
        self
    }

    fn resolve(&self) -> Result<(Icmp6Header, Icmp6Body)> {
        let body = self.body.clone().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "必填字段缺失：message")
        })?;
        let icmp_type = match (self.icmp_type, body.derived_type()) {
            (Some(explicit), _) => explicit,
            (None, Some(derived)) => derived,
            (None, None) => {
                return Err(CoreError::new(
                    codes::PROTOCOL_MISSING_FIELD,
                    "Raw 消息体必须显式指定 icmp_type",
                ));
            }
        };
        let mut header = Icmp6Header {
            icmp_type,
            code: self.code,
            checksum: self.checksum.unwrap_or(0),
        };
        if self.calculate_checksum {
            let probe = Icmp6Packet {
                header: Icmp6Header {
                    checksum: 0,
                    ..header.clone()
                },
                body: body.clone(),
                payload: Payload::None,
                backing: None,
            };
            let bytes = probe.to_memory()?.readable_to_vec();
            header.checksum = message_checksum(
                &bytes,
                self.pseudo_header.as_ref().map(|(src, dst)| (src, dst)),
            );
        }
        Ok((header, body))
    }
}

impl PacketBuilder for Icmp6Builder {
    type Packet = Icmp6Packet;

    fn build(&self) -> Result<Icmp6Packet> {
        let (header, body) = self.resolve()?;
        Ok(Icmp6Packet {
            header,
            body,
            payload: Payload::None,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<Icmp6Packet> {
        if buffer.readable_bytes() < ICMP6_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("ICMPv6 前缀不足 4 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let message_len = buffer.readable_bytes();
        let icmp_type = buffer.read_u8()?;
        let code = buffer.read_u8()?;
        let checksum = buffer.read_u16()?;
        let body = Icmp6Body::parse(icmp_type, buffer)?;
        // 截断停止后残留的字节保留为不透明载荷。
        let payload = if buffer.is_readable() {
            Payload::Opaque(buffer.read_slice(buffer.readable_bytes())?)
        } else {
            Payload::None
        };
        Ok(Icmp6Packet {
            header: Icmp6Header {
                icmp_type,
                code,
                checksum,
            },
            body,
            payload,
            backing: Some(buffer.slice_at(start, message_len)?),
        })
    }

    fn reset(&mut self) -> Result<()> {
        let (_, body) = self.resolve()?;
        let length = ICMP6_HEADER_LEN + body.wire_length()?;
        self.reset_at(0, length)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let (header, body) = self.resolve()?;
        let needed = ICMP6_HEADER_LEN + body.wire_length()?;
        if length < needed {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("重写区间 {length} 字节不足以容纳 {needed} 字节消息"),
            ));
        }
        let backing = self.backing.as_mut().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
        })?;
        let mut window = backing.slice_at(offset, needed)?;
        window.set_writer_index(0)?;
        window.write_u8(header.icmp_type)?;
        window.write_u8(header.code)?;
        window.write_u16(header.checksum)?;
        body.write_into(&mut window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndp::OPTION_MTU;
    use tap_codecs::net::MacAddress;

    fn neighbor_solicitation() -> Icmp6Builder {
        Icmp6Builder::new()
            .message(Icmp6Body::NeighborSolicitation {
                target: "fe80::c7".parse().expect("目标地址"),
                options: alloc::vec![NdpOption::SourceLinkLayerAddress(MacAddress::new([
                    1, 2, 3, 4, 5, 6,
                ]))],
            })
            .pseudo_header(
                "fe80::1".parse().expect("源"),
                "ff02::1:ffc7:0".parse().expect("目的"),
            )
            .calculate_checksum(true)
    }

    /// NS 消息：类型号自动导出，含伪头部的校验和往返。
    #[test]
    fn neighbor_solicitation_round_trip() {
        let packet = neighbor_solicitation().build().expect("构建 NS");
        assert_eq!(packet.header().icmp_type, TYPE_NEIGHBOR_SOLICITATION);

        let src = "fe80::1".parse().expect("源");
        let dst = "ff02::1:ffc7:0".parse().expect("目的");
        assert!(packet.is_valid_checksum(Some((&src, &dst))).expect("验证"));
        assert!(!packet.is_valid_checksum(None).expect("验证"), "缺少伪头部应不匹配");

        let mut wire = packet.to_memory().expect("整条消息");
        let reparsed = Icmp6Builder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header());
        assert_eq!(reparsed.body(), packet.body());
    }

    /// RA 消息的标志位与计时器字段往返。
    #[test]
    fn router_advertisement_round_trip() {
        let packet = Icmp6Builder::new()
            .message(Icmp6Body::RouterAdvertisement {
                current_hop_limit: 64,
                managed: true,
                other: false,
                router_lifetime: 1800,
                reachable_time: 30_000,
                retrans_timer: 1_000,
                options: alloc::vec![NdpOption::Mtu(1500)],
            })
            .calculate_checksum(true)
            .build()
            .expect("构建 RA");

        let mut wire = packet.to_memory().expect("整条消息");
        let reparsed = Icmp6Builder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.body(), packet.body());
        let Icmp6Body::RouterAdvertisement { managed, other, .. } = reparsed.body() else {
            panic!("消息体类型不符");
        };
        assert!(*managed);
        assert!(!*other);
    }

    /// 声明长度为 0 的 TLV 条目触发截断停止：既有选项保留，残留字节
    /// 成为不透明载荷，解析不报错。
    #[test]
    fn zero_length_option_truncates_ns_options() {
        let packet = neighbor_solicitation().build().expect("构建 NS");
        let healthy = packet.wire_length().expect("线缆长度");
        let mut wire = Memory::alloc(healthy + 8);
        wire.write_bytes(&packet.to_memory().expect("消息").readable_to_vec())
            .expect("写消息");
        wire.write_u8(OPTION_MTU).expect("坏条目类型");
        wire.write_u8(0).expect("坏条目长度 0");
        wire.write_bytes(&[0; 6]).expect("坏条目残骸");
        wire.set_reader_index(0).expect("重置");

        let reparsed = Icmp6Builder::parse(&mut wire).expect("截断停止不是错误");
        assert_eq!(reparsed.body().options().len(), 1, "坏条目之前的选项必须保留");
        let residue = reparsed.payload().as_opaque().expect("残留字节保留为载荷");
        assert_eq!(residue.readable_bytes(), 8);
    }

    /// 非邻居发现类型落入 Raw 形态，原样往返。
    #[test]
    fn echo_request_uses_raw_body() {
        let packet = Icmp6Builder::new()
            .icmp_type(128)
            .message(Icmp6Body::Raw(alloc::vec![0x12, 0x34, 0x00, 0x07, 0xAB]))
            .calculate_checksum(true)
            .build()
            .expect("构建回显请求");
        let mut wire = packet.to_memory().expect("整条消息");
        let reparsed = Icmp6Builder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.body(), packet.body());
        assert!(reparsed.is_valid_checksum(None).expect("验证"));
    }

    /// reset 原地改写 NA 的 Override 标志。
    #[test]
    fn reset_rewrites_advertisement_in_place() {
        let packet = Icmp6Builder::new()
            .message(Icmp6Body::NeighborAdvertisement {
                router: false,
                solicited: true,
                override_flag: false,
                target: "fe80::c7".parse().expect("目标"),
                options: alloc::vec![],
            })
            .calculate_checksum(true)
            .build()
            .expect("构建 NA");
        let mut wire = packet.to_memory().expect("整条消息");
        let parsed = Icmp6Builder::parse(&mut wire).expect("解析");

        let Icmp6Body::NeighborAdvertisement { target, .. } = parsed.body() else {
            panic!("消息体类型不符");
        };
        let mut builder = parsed
            .builder()
            .message(Icmp6Body::NeighborAdvertisement {
                router: false,
                solicited: true,
                override_flag: true,
                target: *target,
                options: alloc::vec![],
            })
            .calculate_checksum(true);
        builder.reset().expect("原地重写");

        wire.set_reader_index(0).expect("重读");
        let mutated = Icmp6Builder::parse(&mut wire).expect("重解析");
        let Icmp6Body::NeighborAdvertisement { override_flag, .. } = mutated.body() else {
            panic!("消息体类型不符");
        };
        assert!(*override_flag, "标志改写必须落在原缓冲");
    }
}
