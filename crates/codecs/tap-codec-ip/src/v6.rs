//! IPv6 固定头部编解码（RFC 8200）。
//!
//! # 教案定位（Why）
//! - IPv6 固定头部定长 40 字节，复杂度集中在首个 32 位字的位域拆解与
//!   `next_header` 驱动的扩展头链；
//! - 扩展头解码器与传输层解码器共用同一张协议号派发表，因此本模块
//!   只负责固定头部，链式展开由派发表完成。

use alloc::boxed::Box;
use alloc::format;
use core::any::Any;
use core::net::Ipv6Addr;

use tap_buffer::Memory;
use tap_core::{CoreError, ProtocolId, Result, codes};
use tap_codecs::net::{read_ipv6, write_ipv6};
use tap_codecs::{Header, IP_DISPATCH, PacketBuilder, PacketView, Payload};

/// IPv6 固定头部长度（字节）。
pub const IPV6_HEADER_LEN: usize = 40;

pub(crate) fn decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(Ipv6Builder::parse(memory)?))
}

/// IPv6 固定头部字段（版本恒为 6）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ipv6Header {
    /// 流量类别。
    pub traffic_class: u8,
    /// 流标签（20 位）。
    pub flow_label: u32,
    /// 载荷长度（含扩展头）。
    pub payload_length: u16,
    /// 下一头部号。
    pub next_header: ProtocolId,
    /// 跳数上限。
    pub hop_limit: u8,
    /// 源地址。
    pub source: Ipv6Addr,
    /// 目的地址。
    pub destination: Ipv6Addr,
}

impl Ipv6Header {
    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> Ipv6Builder {
        Ipv6Builder {
            traffic_class: self.traffic_class,
            flow_label: self.flow_label,
            payload_length: Some(self.payload_length),
            next_header: Some(self.next_header),
            hop_limit: Some(self.hop_limit),
            source: Some(self.source),
            destination: Some(self.destination),
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        let word = (6u32 << 28) | (u32::from(self.traffic_class) << 20) | (self.flow_label & 0xF_FFFF);
        memory.write_u32(word)?;
        memory.write_u16(self.payload_length)?;
        memory.write_u8(self.next_header.number())?;
        memory.write_u8(self.hop_limit)?;
        write_ipv6(memory, &self.source)?;
        write_ipv6(memory, &self.destination)
    }
}

impl Header for Ipv6Header {
    fn length(&self) -> usize {
        IPV6_HEADER_LEN
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(IPV6_HEADER_LEN);
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// IPv6 报文：固定头部 + 按下一头部号展开的载荷链。
#[derive(Debug)]
pub struct Ipv6Packet {
    header: Ipv6Header,
    payload: Payload,
    backing: Option<Memory>,
}

impl Ipv6Packet {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &Ipv6Header {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器，供原地重写使用。
    #[must_use]
    pub fn builder(&self) -> Ipv6Builder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for Ipv6Packet {
    fn header_length(&self) -> usize {
        IPV6_HEADER_LEN
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// IPv6 构建器。
#[derive(Debug, Clone, Default)]
pub struct Ipv6Builder {
    traffic_class: u8,
    flow_label: u32,
    payload_length: Option<u16>,
    next_header: Option<ProtocolId>,
    hop_limit: Option<u8>,
    source: Option<Ipv6Addr>,
    destination: Option<Ipv6Addr>,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl Ipv6Builder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定流量类别。
    #[must_use]
    pub fn traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    /// 指定流标签（20 位）。
    #[must_use]
    pub fn flow_label(mut self, flow_label: u32) -> Self {
        self.flow_label = flow_label;
        self
    }

    /// 显式指定载荷长度；缺省时由载荷缓冲推导。
    #[must_use]
    pub fn payload_length(mut self, payload_length: u16) -> Self {
        self.payload_length = Some(payload_length);
        self
    }

    /// 指定下一头部号。
    #[must_use]
    pub fn next_header(mut self, next_header: ProtocolId) -> Self {
        self.next_header = Some(next_header);
        self
    }

    /// 指定跳数上限。
    #[must_use]
    pub fn hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = Some(hop_limit);
        self
    }

    /// 指定源地址。
    #[must_use]
    pub fn source(mut self, source: Ipv6Addr) -> Self {
        self.source = Some(source);
        self
    }

    /// 指定目的地址。
    #[must_use]
    pub fn destination(mut self, destination: Ipv6Addr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// 指定载荷来源缓冲（其可读区间视为载荷）。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<Ipv6Header> {
        if self.flow_label > 0xF_FFFF {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                "流标签超出 20 位范围",
            ));
        }
        let payload_length = match self.payload_length {
            Some(value) => value,
            None => self.payload.as_ref().map_or(0, Memory::readable_bytes) as u16,
        };
        Ok(Ipv6Header {
            traffic_class: self.traffic_class,
            flow_label: self.flow_label,
            payload_length,
            next_header: require(self.next_header, "next_header")?,
            hop_limit: require(self.hop_limit, "hop_limit")?,
            source: require(self.source, "source")?,
            destination: require(self.destination, "destination")?,
        })
    }
}

impl PacketBuilder for Ipv6Builder {
    type Packet = Ipv6Packet;

    fn build(&self) -> Result<Ipv6Packet> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(Ipv6Packet {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<Ipv6Packet> {
        if buffer.readable_bytes() < IPV6_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IPv6 头部不足 40 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let word = buffer.read_u32()?;
        let version = (word >> 28) as u8;
        if version != 6 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IPv6 版本号非法：{version}"),
            ));
        }
        let traffic_class = ((word >> 20) & 0xFF) as u8;
        let flow_label = word & 0xF_FFFF;
        let payload_length = buffer.read_u16()?;
        let next_header = ProtocolId::from_number(buffer.read_u8()?);
        let hop_limit = buffer.read_u8()?;
        let source = read_ipv6(buffer)?;
        let destination = read_ipv6(buffer)?;

        let payload_len = usize::from(payload_length).min(buffer.readable_bytes());
        let payload_memory = buffer.read_slice(payload_len)?;
        let payload = IP_DISPATCH.decode(next_header, payload_memory)?;

        Ok(Ipv6Packet {
            header: Ipv6Header {
                traffic_class,
                flow_label,
                payload_length,
                next_header,
                hop_limit,
                source,
                destination,
            },
            payload,
            backing: Some(buffer.slice_at(start, IPV6_HEADER_LEN)?),
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.reset_at(0, IPV6_HEADER_LEN)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < IPV6_HEADER_LEN {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("重写区间 {length} 字节不足以容纳 {IPV6_HEADER_LEN} 字节头部"),
            ));
        }
        let backing = self.backing.as_mut().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
        })?;
        let mut window = backing.slice_at(offset, IPV6_HEADER_LEN)?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}

fn require<T>(field: Option<T>, name: &'static str) -> Result<T> {
    field.ok_or_else(|| {
        CoreError::new(
            codes::PROTOCOL_MISSING_FIELD,
            format!("必填字段缺失：{name}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_builder() -> Ipv6Builder {
        Ipv6Builder::new()
            .traffic_class(0x0A)
            .flow_label(0x1_2345)
            .next_header(ProtocolId::NoNextHeader)
            .hop_limit(64)
            .source("fe80::1".parse().expect("源地址"))
            .destination("fe80::2".parse().expect("目的地址"))
    }

    /// 构建 → 线缆 → 重解析的字段往返（位域拆装正确性）。
    #[test]
    fn build_then_parse_round_trip() {
        let packet = sample_builder().build().expect("构建 IPv6 报文");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        assert_eq!(wire.readable_bytes(), IPV6_HEADER_LEN);

        let reparsed = Ipv6Builder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header());
        assert_eq!(reparsed.header().traffic_class, 0x0A);
        assert_eq!(reparsed.header().flow_label, 0x1_2345);
    }

    /// reset 原地改写跳数上限，原缓冲重解析可见。
    #[test]
    fn reset_rewrites_hop_limit_in_place() {
        let packet = sample_builder().build().expect("构建");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let parsed = Ipv6Builder::parse(&mut wire).expect("解析");

        let mut builder = parsed.builder().hop_limit(1);
        builder.reset().expect("原地重写");

        wire.set_reader_index(0).expect("重读");
        let mutated = Ipv6Builder::parse(&mut wire).expect("重解析");
        assert_eq!(mutated.header().hop_limit, 1);
        assert_eq!(mutated.header().source, parsed.header().source);
    }

    #[test]
    fn oversized_flow_label_fails_build() {
        let err = sample_builder()
            .flow_label(0x10_0000)
            .build()
            .expect_err("超出 20 位的流标签必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_INVALID_FIELD);
    }

    #[test]
    fn invalid_version_fails_parse() {
        let mut wire = Memory::from_slice(&[0x45; 40]);
        let err = Ipv6Builder::parse(&mut wire).expect_err("版本 4 必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_DECODE);
    }
}
