//! IPv4 头部编解码（RFC 791）。
//!
//! # 教案定位（Why）
//! - IPv4 是校验和逻辑的代表实现：RFC 1071 一补数求和、计算时校验
//!   字段按零、验证时重算比对；
//! - 头部长度可变（IHL 5–15 个 32 位字），选项字节随头部一并解析与
//!   重建。
//!
//! # 使用契约（What）
//! - [`Ipv4Builder::calculate_checksum`] 置位后，`build`/`reset` 写入
//!   计算值而非调用方提供值；
//! - 解析得到的载荷子视图按 `protocol` 字段经进程级派发表展开；
//! - [`Ipv4Header::is_valid_checksum`] 只重算头部，不触碰载荷。

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::any::Any;
use core::net::Ipv4Addr;

use tap_buffer::Memory;
use tap_core::{CoreError, ProtocolId, Result, codes};
use tap_codecs::checksum::internet_checksum;
use tap_codecs::net::{read_ipv4, write_ipv4};
use tap_codecs::{Header, IP_DISPATCH, PacketBuilder, PacketView, Payload};

/// 无选项时的 IPv4 头部长度（字节）。
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// 头部内校验和字段的偏移。
const CHECKSUM_OFFSET: usize = 10;

pub(crate) fn decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(Ipv4Builder::parse(memory)?))
}

/// IPv4 头部字段（版本恒为 4，IHL 由选项长度导出）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    /// 区分服务码点（6 位）。
    pub dscp: u8,
    /// 显式拥塞通知（2 位）。
    pub ecn: u8,
    /// 头部 + 载荷的总长度。
    pub total_length: u16,
    /// 标识。
    pub identification: u16,
    /// Don't Fragment 标志。
    pub dont_fragment: bool,
    /// More Fragments 标志。
    pub more_fragments: bool,
    /// 分片偏移（13 位，8 字节单位）。
    pub fragment_offset: u16,
    /// 生存时间。
    pub ttl: u8,
    /// 载荷协议号。
    pub protocol: ProtocolId,
    /// 头部校验和。
    pub checksum: u16,
    /// 源地址。
    pub source: Ipv4Addr,
    /// 目的地址。
    pub destination: Ipv4Addr,
    /// 选项字节（长度为 4 的倍数，至多 40 字节）。
    pub options: Vec<u8>,
}

impl Ipv4Header {
    /// IHL 字段值（32 位字数）。
    #[must_use]
    pub fn ihl(&self) -> u8 {
        (IPV4_MIN_HEADER_LEN / 4) as u8 + (self.options.len() / 4) as u8
    }

    /// 重算头部校验和并与存量比对。
    pub fn is_valid_checksum(&self) -> Result<bool> {
        let wire = self.to_memory()?;
        let bytes = wire.readable_to_vec();
        Ok(internet_checksum(&bytes, Some(CHECKSUM_OFFSET)) == self.checksum)
    }

    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> Ipv4Builder {
        Ipv4Builder {
            dscp: self.dscp,
            ecn: self.ecn,
            total_length: Some(self.total_length),
            identification: self.identification,
            dont_fragment: self.dont_fragment,
            more_fragments: self.more_fragments,
            fragment_offset: self.fragment_offset,
            ttl: Some(self.ttl),
            protocol: Some(self.protocol),
            checksum: Some(self.checksum),
            calculate_checksum: false,
            source: Some(self.source),
            destination: Some(self.destination),
            options: self.options.clone(),
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8((4 << 4) | self.ihl())?;
        memory.write_u8((self.dscp << 2) | (self.ecn & 0b11))?;
        memory.write_u16(self.total_length)?;
        memory.write_u16(self.identification)?;
        let flags_fragment = (u16::from(self.dont_fragment) << 14)
            | (u16::from(self.more_fragments) << 13)
            | (self.fragment_offset & 0x1FFF);
        memory.write_u16(flags_fragment)?;
        memory.write_u8(self.ttl)?;
        memory.write_u8(self.protocol.number())?;
        memory.write_u16(self.checksum)?;
        write_ipv4(memory, &self.source)?;
        write_ipv4(memory, &self.destination)?;
        memory.write_bytes(&self.options)
    }
}

impl Header for Ipv4Header {
    fn length(&self) -> usize {
        IPV4_MIN_HEADER_LEN + self.options.len()
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(self.length());
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// IPv4 报文：头部 + 按协议号展开的载荷链。
#[derive(Debug)]
pub struct Ipv4Packet {
    header: Ipv4Header,
    payload: Payload,
    backing: Option<Memory>,
}

impl Ipv4Packet {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &Ipv4Header {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器，供原地重写使用。
    #[must_use]
    pub fn builder(&self) -> Ipv4Builder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for Ipv4Packet {
    fn header_length(&self) -> usize {
        self.header.length()
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// IPv4 构建器：字段暂存 + 可选载荷来源 + 可选后备缓冲。
#[derive(Debug, Clone, Default)]
pub struct Ipv4Builder {
    dscp: u8,
    ecn: u8,
    total_length: Option<u16>,
    identification: u16,
    dont_fragment: bool,
    more_fragments: bool,
    fragment_offset: u16,
    ttl: Option<u8>,
    protocol: Option<ProtocolId>,
    checksum: Option<u16>,
    calculate_checksum: bool,
    source: Option<Ipv4Addr>,
    destination: Option<Ipv4Addr>,
    options: Vec<u8>,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl Ipv4Builder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定区分服务码点。
    #[must_use]
    pub fn dscp(mut self, dscp: u8) -> Self {
        self.dscp = dscp;
        self
    }

    /// 指定显式拥塞通知。
    #[must_use]
    pub fn ecn(mut self, ecn: u8) -> Self {
        self.ecn = ecn;
        self
    }

    /// 显式指定总长度；缺省时由头部与载荷长度推导。
    #[must_use]
    pub fn total_length(mut self, total_length: u16) -> Self {
        self.total_length = Some(total_length);
        self
    }

    /// 指定标识字段。
    #[must_use]
    pub fn identification(mut self, identification: u16) -> Self {
        self.identification = identification;
        self
    }

    /// 指定 Don't Fragment 标志。
    #[must_use]
    pub fn dont_fragment(mut self, dont_fragment: bool) -> Self {
        self.dont_fragment = dont_fragment;
        self
    }

    /// 指定 More Fragments 标志。
    #[must_use]
    pub fn more_fragments(mut self, more_fragments: bool) -> Self {
        self.more_fragments = more_fragments;
        self
    }

    /// 指定分片偏移（13 位）。
    #[must_use]
    pub fn fragment_offset(mut self, fragment_offset: u16) -> Self {
        self.fragment_offset = fragment_offset;
        self
    }

    /// 指定生存时间。
    #[must_use]
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// 指定载荷协议号。
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolId) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// 指定调用方提供的校验和（与 [`Self::calculate_checksum`] 互斥生效）。
    #[must_use]
    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// 置位后 `build`/`reset` 计算并写入校验和，忽略调用方提供值。
    #[must_use]
    pub fn calculate_checksum(mut self, calculate: bool) -> Self {
        self.calculate_checksum = calculate;
        self
    }

    /// 指定源地址。
    #[must_use]
    pub fn source(mut self, source: Ipv4Addr) -> Self {
        self.source = Some(source);
        self
    }

    /// 指定目的地址。
    #[must_use]
    pub fn destination(mut self, destination: Ipv4Addr) -> Self {
        self.destination = Some(destination);
        self
    }

    /// 指定选项字节（长度必须为 4 的倍数，至多 40 字节）。
    #[must_use]
    pub fn options(mut self, options: Vec<u8>) -> Self {
        self.options = options;
        self
    }

    /// 指定载荷来源缓冲（其可读区间视为载荷）。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<Ipv4Header> {
        if self.options.len() % 4 != 0 || self.options.len() > 40 {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                format!("IPv4 选项长度 {} 非法（须为 4 的倍数且不超过 40）", self.options.len()),
            ));
        }
        if self.dscp > 0x3F {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                "DSCP 超出 6 位范围",
            ));
        }
        if self.fragment_offset > 0x1FFF {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                "分片偏移超出 13 位范围",
            ));
        }
        let header_len = IPV4_MIN_HEADER_LEN + self.options.len();
        let payload_len = self.payload.as_ref().map_or(0, Memory::readable_bytes);
        let total_length = match self.total_length {
            Some(value) => value,
            None => (header_len + payload_len) as u16,
        };
        let mut header = Ipv4Header {
            dscp: self.dscp,
            ecn: self.ecn,
            total_length,
            identification: self.identification,
            dont_fragment: self.dont_fragment,
            more_fragments: self.more_fragments,
            fragment_offset: self.fragment_offset,
            ttl: require(self.ttl, "ttl")?,
            protocol: require(self.protocol, "protocol")?,
            checksum: 0,
            source: require(self.source, "source")?,
            destination: require(self.destination, "destination")?,
            options: self.options.clone(),
        };
        header.checksum = if self.calculate_checksum {
            let wire = header.to_memory()?;
            internet_checksum(&wire.readable_to_vec(), Some(CHECKSUM_OFFSET))
        } else {
            self.checksum.unwrap_or(0)
        };
        Ok(header)
    }
}

impl PacketBuilder for Ipv4Builder {
    type Packet = Ipv4Packet;

    fn build(&self) -> Result<Ipv4Packet> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(Ipv4Packet {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<Ipv4Packet> {
        if buffer.readable_bytes() < IPV4_MIN_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IPv4 头部不足 20 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let first = buffer.read_u8()?;
        let version = first >> 4;
        if version != 4 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IPv4 版本号非法：{version}"),
            ));
        }
        let ihl = first & 0x0F;
        if ihl < 5 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IHL {ihl} 小于最小值 5"),
            ));
        }
        let header_len = usize::from(ihl) * 4;
        if buffer.readable_bytes() + 1 < header_len {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("IPv4 头部声明 {header_len} 字节，缓冲不足"),
            ));
        }
        let tos = buffer.read_u8()?;
        let total_length = buffer.read_u16()?;
        let identification = buffer.read_u16()?;
        let flags_fragment = buffer.read_u16()?;
        let ttl = buffer.read_u8()?;
        let protocol = ProtocolId::from_number(buffer.read_u8()?);
        let checksum = buffer.read_u16()?;
        let source = read_ipv4(buffer)?;
        let destination = read_ipv4(buffer)?;
        let mut options = alloc::vec![0u8; header_len - IPV4_MIN_HEADER_LEN];
        buffer.read_bytes(&mut options)?;

        let declared_payload = usize::from(total_length).saturating_sub(header_len);
        let payload_len = declared_payload.min(buffer.readable_bytes());
        let payload_memory = buffer.read_slice(payload_len)?;
        let payload = IP_DISPATCH.decode(protocol, payload_memory)?;

        Ok(Ipv4Packet {
            header: Ipv4Header {
                dscp: tos >> 2,
                ecn: tos & 0b11,
                total_length,
                identification,
                dont_fragment: flags_fragment & 0x4000 != 0,
                more_fragments: flags_fragment & 0x2000 != 0,
                fragment_offset: flags_fragment & 0x1FFF,
                ttl,
                protocol,
                checksum,
                source,
                destination,
                options,
            },
            payload,
            backing: Some(buffer.slice_at(start, header_len)?),
        })
    }

    fn reset(&mut self) -> Result<()> {
        let length = IPV4_MIN_HEADER_LEN + self.options.len();
        self.reset_at(0, length)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < header.length() {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("重写区间 {length} 字节不足以容纳 {} 字节头部", header.length()),
            ));
        }
        let backing = self.backing.as_mut().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
        })?;
        let mut window = backing.slice_at(offset, header.length())?;
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
