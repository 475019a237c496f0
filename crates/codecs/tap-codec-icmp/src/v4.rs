//! ICMPv4 编解码（RFC 792）。
//!
//! # 教案定位（Why）
//! - ICMPv4 的校验和覆盖整条消息（8 字节头部 + 载荷），与 IPv4 仅头部
//!   的口径不同，两者共用同一套 RFC 1071 求和原语；
//! - `rest_of_header` 的语义由 `(type, code)` 决定（回显消息为
//!   标识符/序列号），目录翻译见 [`crate::catalog`]。

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::any::Any;

use tap_buffer::Memory;
use tap_core::{CoreError, Result, codes};
use tap_codecs::checksum::internet_checksum;
use tap_codecs::{Header, PacketBuilder, PacketView, Payload};

/// ICMPv4 头部长度（字节）。
pub const ICMP4_HEADER_LEN: usize = 8;

/// 头部内校验和字段的偏移。
const CHECKSUM_OFFSET: usize = 2;

pub(crate) fn decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(Icmp4Builder::parse(memory)?))
}

/// ICMPv4 头部：类型 + 代码 + 校验和 + 类型相关的 4 字节。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Icmp4Header {
    /// 消息类型。
    pub icmp_type: u8,
    /// 消息代码。
    pub code: u8,
    /// 消息校验和（覆盖头部与载荷）。
    pub checksum: u16,
    /// 类型相关的剩余头部字段。
    pub rest_of_header: u32,
}

impl Icmp4Header {
    /// 回显消息的标识符（`rest_of_header` 高 16 位）。
    #[must_use]
    pub fn identifier(&self) -> u16 {
        (self.rest_of_header >> 16) as u16
    }

    /// 回显消息的序列号（`rest_of_header` 低 16 位）。
    #[must_use]
    pub fn sequence(&self) -> u16 {
        (self.rest_of_header & 0xFFFF) as u16
    }

    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> Icmp4Builder {
        Icmp4Builder {
            icmp_type: Some(self.icmp_type),
            code: self.code,
            checksum: Some(self.checksum),
            calculate_checksum: false,
            rest_of_header: self.rest_of_header,
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8(self.icmp_type)?;
        memory.write_u8(self.code)?;
        memory.write_u16(self.checksum)?;
        memory.write_u32(self.rest_of_header)
    }
}

impl Header for Icmp4Header {
    fn length(&self) -> usize {
        ICMP4_HEADER_LEN
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(ICMP4_HEADER_LEN);
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// ICMPv4 报文：头部 + 不透明载荷。
#[derive(Debug)]
pub struct Icmp4Packet {
    header: Icmp4Header,
    payload: Payload,
    backing: Option<Memory>,
}

impl Icmp4Packet {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &Icmp4Header {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器。
    #[must_use]
    pub fn builder(&self) -> Icmp4Builder {
        let mut builder = self.header.builder();
        builder.payload = self
            .payload
            .as_opaque()
            .map(|memory| Memory::from_slice(&memory.readable_to_vec()));
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }

    /// 重算整条消息（头部 + 载荷）的校验和并与存量比对。
    pub fn is_valid_checksum(&self) -> Result<bool> {
        let bytes = self.message_bytes()?;
        Ok(internet_checksum(&bytes, Some(CHECKSUM_OFFSET)) == self.header.checksum)
    }

    /// 导出整条消息（头部 + 载荷）的线缆缓冲。
    pub fn to_memory(&self) -> Result<Memory> {
        Ok(Memory::from_slice(&self.message_bytes()?))
    }

    fn message_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = self.header.to_memory()?.readable_to_vec();
        if let Some(payload) = self.payload.as_opaque() {
            bytes.extend_from_slice(&payload.readable_to_vec());
        }
        Ok(bytes)
    }
}

impl PacketView for Icmp4Packet {
    fn header_length(&self) -> usize {
        ICMP4_HEADER_LEN
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// ICMPv4 构建器。
#[derive(Debug, Clone, Default)]
pub struct Icmp4Builder {
    icmp_type: Option<u8>,
    code: u8,
    checksum: Option<u16>,
    calculate_checksum: bool,
    rest_of_header: u32,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl Icmp4Builder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定消息类型。
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

    /// 指定类型相关的剩余头部字段。
    #[must_use]
    pub fn rest_of_header(mut self, rest_of_header: u32) -> Self {
        self.rest_of_header = rest_of_header;
        self
    }

    /// 以标识符/序列号形式填充剩余头部（回显消息便捷入口）。
    #[must_use]
    pub fn echo(self, identifier: u16, sequence: u16) -> Self {
        self.rest_of_header((u32::from(identifier) << 16) | u32::from(sequence))
    }

    /// 指定载荷来源缓冲（其可读区间参与校验和）。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<Icmp4Header> {
        let mut header = Icmp4Header {
            icmp_type: self.icmp_type.ok_or_else(|| {
                CoreError::new(codes::PROTOCOL_MISSING_FIELD, "必填字段缺失：icmp_type")
            })?,
            code: self.code,
            checksum: 0,
            rest_of_header: self.rest_of_header,
        };
        header.checksum = if self.calculate_checksum {
            let mut bytes = header.to_memory()?.readable_to_vec();
            if let Some(payload) = &self.payload {
                bytes.extend_from_slice(&payload.readable_to_vec());
            }
            internet_checksum(&bytes, Some(CHECKSUM_OFFSET))
        } else {
            self.checksum.unwrap_or(0)
        };
        Ok(header)
    }
}

impl PacketBuilder for Icmp4Builder {
    type Packet = Icmp4Packet;

    fn build(&self) -> Result<Icmp4Packet> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(Icmp4Packet {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<Icmp4Packet> {
        if buffer.readable_bytes() < ICMP4_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("ICMPv4 头部不足 8 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let icmp_type = buffer.read_u8()?;
        let code = buffer.read_u8()?;
        let checksum = buffer.read_u16()?;
        let rest_of_header = buffer.read_u32()?;
        let backing = buffer.slice_at(start, ICMP4_HEADER_LEN)?;
        let payload = if buffer.is_readable() {
            Payload::Opaque(buffer.read_slice(buffer.readable_bytes())?)
        } else {
            Payload::None
        };
        Ok(Icmp4Packet {
            header: Icmp4Header {
                icmp_type,
                code,
                checksum,
                rest_of_header,
            },
            payload,
            backing: Some(backing),
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.reset_at(0, ICMP4_HEADER_LEN)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < ICMP4_HEADER_LEN {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                format!("重写区间 {length} 字节不足以容纳 {ICMP4_HEADER_LEN} 字节头部"),
            ));
        }
        let backing = self.backing.as_mut().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
        })?;
        let mut window = backing.slice_at(offset, ICMP4_HEADER_LEN)?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}
