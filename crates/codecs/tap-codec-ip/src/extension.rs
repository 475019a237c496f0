//! IPv6 扩展头编解码（RFC 8200 §4，RFC 4302）。
//!
//! # 教案定位（Why）
//! - 扩展头是链式结构逻辑的代表实现：每个头携带下一头部号，
//!   Hop-by-Hop / Destination / Routing 另带 8 字节单位的长度字段，
//!   总长公式 `8 × (extension_length + 1)` 在构建与解析两条路径上
//!   必须一致；
//! - 原型中的继承层次在此压平：公共字段 [`ExtensionFields`] 按值嵌入
//!   各具体头部，公共行为以普通方法表达。
//!
//! # 使用契约（What）
//! - Hop-by-Hop / Destination：选项字节数必须等于
//!   `8 × (extension_length + 1) − 2`，否则构建失败；
//! - Routing：类型专属数据为总长减 4 字节前缀；
//! - Fragment：恒为 8 字节，偏移以 8 字节为单位（13 位）；
//! - Authentication：总长按 `(payload_length + 2) × 4` 计算，
//!   ICV 为总长减 12 字节固定前缀。

use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use core::any::Any;

use tap_buffer::Memory;
use tap_core::{CoreError, ProtocolId, Result, codes};
use tap_codecs::{Header, IP_DISPATCH, PacketBuilder, PacketView, Payload};

/// 扩展头共享的公共字段，按值嵌入各具体头部。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionFields {
    /// 下一头部号。
    pub next_header: ProtocolId,
    /// 扩展长度（8 字节单位，不含首个 8 字节）。
    pub extension_length: u8,
}

impl ExtensionFields {
    /// 头部总长：`8 × (extension_length + 1)`，构建与解析共用。
    #[must_use]
    pub fn total_length(&self) -> usize {
        8 * (usize::from(self.extension_length) + 1)
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

fn missing_backing() -> CoreError {
    CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
}

fn short_window(length: usize, needed: usize) -> CoreError {
    CoreError::new(
        codes::BUFFER_OUT_OF_BOUNDS,
        format!("重写区间 {length} 字节不足以容纳 {needed} 字节头部"),
    )
}

// ---- Hop-by-Hop / Destination Options 的公共骨架 ----

/// 选项类扩展头（Hop-by-Hop / Destination）的公共核心。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OptionsCore {
    extension: ExtensionFields,
    options: Vec<u8>,
}

impl OptionsCore {
    fn checked(
        next_header: ProtocolId,
        extension_length: u8,
        options: Vec<u8>,
        label: &'static str,
    ) -> Result<Self> {
        let extension = ExtensionFields {
            next_header,
            extension_length,
        };
        let expected = extension.total_length() - 2;
        if options.len() != expected {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                format!(
                    "{label} 选项字节数 {} 与 extension_length {extension_length} 不符（应为 {expected}）",
                    options.len()
                ),
            ));
        }
        Ok(Self { extension, options })
    }

    fn parse(buffer: &mut Memory, label: &'static str) -> Result<(Self, Payload, Memory)> {
        if buffer.readable_bytes() < 8 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("{label} 头部不足 8 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let next_header = ProtocolId::from_number(buffer.read_u8()?);
        let extension_length = buffer.read_u8()?;
        let extension = ExtensionFields {
            next_header,
            extension_length,
        };
        let total = extension.total_length();
        if buffer.readable_bytes() + 2 < total {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("{label} 声明总长 {total} 字节，缓冲不足"),
            ));
        }
        let mut options = alloc::vec![0u8; total - 2];
        buffer.read_bytes(&mut options)?;
        let backing = buffer.slice_at(start, total)?;
        let payload_memory = buffer.read_slice(buffer.readable_bytes())?;
        let payload = IP_DISPATCH.decode(next_header, payload_memory)?;
        Ok((Self { extension, options }, payload, backing))
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8(self.extension.next_header.number())?;
        memory.write_u8(self.extension.extension_length)?;
        memory.write_bytes(&self.options)
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(self.extension.total_length());
        self.write_into(&mut memory)?;
        Ok(memory)
    }

    fn reset_at(&self, backing: &mut Memory, offset: usize, length: usize) -> Result<()> {
        let needed = self.extension.total_length();
        if length < needed {
            return Err(short_window(length, needed));
        }
        let mut window = backing.slice_at(offset, needed)?;
        window.set_writer_index(0)?;
        self.write_into(&mut window)
    }
}

macro_rules! options_extension_header {
    (
        $(#[$docs:meta])*
        $header:ident, $packet:ident, $builder:ident, $decode:ident, $label:literal
    ) => {
        $(#[$docs])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $header {
            core: OptionsCore,
        }

        impl $header {
            /// 公共扩展字段。
            #[must_use]
            pub fn extension(&self) -> &ExtensionFields {
                &self.core.extension
            }

            /// 下一头部号。
            #[must_use]
            pub fn next_header(&self) -> ProtocolId {
                self.core.extension.next_header
            }

            /// 选项字节。
            #[must_use]
            pub fn options(&self) -> &[u8] {
                &self.core.options
            }

            /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
            #[must_use]
            pub fn builder(&self) -> $builder {
                $builder {
                    next_header: Some(self.core.extension.next_header),
                    extension_length: self.core.extension.extension_length,
                    options: self.core.options.clone(),
                    payload: None,
                    backing: None,
                }
            }
        }

        impl Header for $header {
            fn length(&self) -> usize {
                self.core.extension.total_length()
            }

            fn to_memory(&self) -> Result<Memory> {
                self.core.to_memory()
            }
        }

        #[doc = concat!($label, " 报文：头部 + 按下一头部号展开的载荷链。")]
        #[derive(Debug)]
        pub struct $packet {
            header: $header,
            payload: Payload,
            backing: Option<Memory>,
        }

        impl $packet {
            /// 头部视图。
            #[must_use]
            pub fn header(&self) -> &$header {
                &self.header
            }

            /// 返回预填充且携带后备缓冲的构建器，供原地重写使用。
            #[must_use]
            pub fn builder(&self) -> $builder {
                let mut builder = self.header.builder();
                builder.backing = self.backing.as_ref().map(Memory::duplicate);
                builder
            }
        }

        impl PacketView for $packet {
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

        #[doc = concat!($label, " 构建器。")]
        #[derive(Debug, Clone, Default)]
        pub struct $builder {
            next_header: Option<ProtocolId>,
            extension_length: u8,
            options: Vec<u8>,
            payload: Option<Memory>,
            backing: Option<Memory>,
        }

        impl $builder {
            /// 创建空构建器。
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// 指定下一头部号。
            #[must_use]
            pub fn next_header(mut self, next_header: ProtocolId) -> Self {
                self.next_header = Some(next_header);
                self
            }

            /// 指定扩展长度（8 字节单位）。
            #[must_use]
            pub fn extension_length(mut self, extension_length: u8) -> Self {
                self.extension_length = extension_length;
                self
            }

            /// 指定选项字节（长度必须等于 `8 × (extension_length + 1) − 2`）。
            #[must_use]
            pub fn options(mut self, options: Vec<u8>) -> Self {
                self.options = options;
                self
            }

            /// 指定载荷来源缓冲。
            #[must_use]
            pub fn payload(mut self, payload: Memory) -> Self {
                self.payload = Some(payload);
                self
            }

            fn core(&self) -> Result<OptionsCore> {
                OptionsCore::checked(
                    require(self.next_header, "next_header")?,
                    self.extension_length,
                    self.options.clone(),
                    $label,
                )
            }
        }

        impl PacketBuilder for $builder {
            type Packet = $packet;

            fn build(&self) -> Result<$packet> {
                let core = self.core()?;
                let payload = match &self.payload {
                    Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
                    _ => Payload::None,
                };
                Ok($packet {
                    header: $header { core },
                    payload,
                    backing: self.backing.as_ref().map(Memory::duplicate),
                })
            }

            fn parse(buffer: &mut Memory) -> Result<$packet> {
                let (core, payload, backing) = OptionsCore::parse(buffer, $label)?;
                Ok($packet {
                    header: $header { core },
                    payload,
                    backing: Some(backing),
                })
            }

            fn reset(&mut self) -> Result<()> {
                let length = 8 * (usize::from(self.extension_length) + 1);
                self.reset_at(0, length)
            }

            fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
                let core = self.core()?;
                let backing = self.backing.as_mut().ok_or_else(missing_backing)?;
                core.reset_at(backing, offset, length)
            }
        }

        /// 派发表使用的解码入口。
        pub(crate) fn $decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
            Ok(Box::new(<$builder>::parse(memory)?))
        }
    };
}

options_extension_header!(
    /// Hop-by-Hop Options 扩展头：逐跳处理的选项容器。
    HopByHopOptionsHeader,
    HopByHopOptionsPacket,
    HopByHopOptionsBuilder,
    decode_hop_by_hop,
    "Hop-by-Hop Options"
);

options_extension_header!(
    /// Destination Options 扩展头：仅目的节点处理的选项容器。
    DestinationOptionsHeader,
    DestinationOptionsPacket,
    DestinationOptionsBuilder,
    decode_destination,
    "Destination Options"
);

// ---- Routing ----

/// Routing 扩展头：路由类型 + 剩余跳数 + 类型专属数据。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingHeader {
    /// 公共扩展字段。
    pub extension: ExtensionFields,
    /// 路由类型。
    pub routing_type: u8,
    /// 剩余路由段数。
    pub segments_left: u8,
    /// 类型专属数据（总长减 4 字节前缀）。
    pub type_data: Vec<u8>,
}

impl RoutingHeader {
    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> RoutingBuilder {
        RoutingBuilder {
            next_header: Some(self.extension.next_header),
            extension_length: self.extension.extension_length,
            routing_type: Some(self.routing_type),
            segments_left: Some(self.segments_left),
            type_data: self.type_data.clone(),
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8(self.extension.next_header.number())?;
        memory.write_u8(self.extension.extension_length)?;
        memory.write_u8(self.routing_type)?;
        memory.write_u8(self.segments_left)?;
        memory.write_bytes(&self.type_data)
    }
}

impl Header for RoutingHeader {
    fn length(&self) -> usize {
        self.extension.total_length()
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(self.length());
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// Routing 报文。
#[derive(Debug)]
pub struct RoutingPacket {
    header: RoutingHeader,
    payload: Payload,
    backing: Option<Memory>,
}

impl RoutingPacket {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &RoutingHeader {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器。
    #[must_use]
    pub fn builder(&self) -> RoutingBuilder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for RoutingPacket {
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

/// Routing 构建器。
#[derive(Debug, Clone, Default)]
pub struct RoutingBuilder {
    next_header: Option<ProtocolId>,
    extension_length: u8,
    routing_type: Option<u8>,
    segments_left: Option<u8>,
    type_data: Vec<u8>,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl RoutingBuilder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定下一头部号。
    #[must_use]
    pub fn next_header(mut self, next_header: ProtocolId) -> Self {
        self.next_header = Some(next_header);
        self
    }

    /// 指定扩展长度（8 字节单位）。
    #[must_use]
    pub fn extension_length(mut self, extension_length: u8) -> Self {
        self.extension_length = extension_length;
        self
    }

    /// 指定路由类型。
    #[must_use]
    pub fn routing_type(mut self, routing_type: u8) -> Self {
        self.routing_type = Some(routing_type);
        self
    }

    /// 指定剩余路由段数。
    #[must_use]
    pub fn segments_left(mut self, segments_left: u8) -> Self {
        self.segments_left = Some(segments_left);
        self
    }

    /// 指定类型专属数据（长度必须等于 `8 × (extension_length + 1) − 4`）。
    #[must_use]
    pub fn type_data(mut self, type_data: Vec<u8>) -> Self {
        self.type_data = type_data;
        self
    }

    /// 指定载荷来源缓冲。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<RoutingHeader> {
        let extension = ExtensionFields {
            next_header: require(self.next_header, "next_header")?,
            extension_length: self.extension_length,
        };
        let expected = extension.total_length() - 4;
        if self.type_data.len() != expected {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                format!(
                    "Routing 类型数据 {} 字节与 extension_length {} 不符（应为 {expected}）",
                    self.type_data.len(),
                    self.extension_length
                ),
            ));
        }
        Ok(RoutingHeader {
            extension,
            routing_type: require(self.routing_type, "routing_type")?,
            segments_left: require(self.segments_left, "segments_left")?,
            type_data: self.type_data.clone(),
        })
    }
}

impl PacketBuilder for RoutingBuilder {
    type Packet = RoutingPacket;

    fn build(&self) -> Result<RoutingPacket> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(RoutingPacket {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<RoutingPacket> {
        if buffer.readable_bytes() < 8 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("Routing 头部不足 8 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let next_header = ProtocolId::from_number(buffer.read_u8()?);
        let extension_length = buffer.read_u8()?;
        let extension = ExtensionFields {
            next_header,
            extension_length,
        };
        let total = extension.total_length();
        if buffer.readable_bytes() + 2 < total {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("Routing 声明总长 {total} 字节，缓冲不足"),
            ));
        }
        let routing_type = buffer.read_u8()?;
        let segments_left = buffer.read_u8()?;
        let mut type_data = alloc::vec![0u8; total - 4];
        buffer.read_bytes(&mut type_data)?;
        let backing = buffer.slice_at(start, total)?;
        let payload_memory = buffer.read_slice(buffer.readable_bytes())?;
        let payload = IP_DISPATCH.decode(next_header, payload_memory)?;
        Ok(RoutingPacket {
            header: RoutingHeader {
                extension,
                routing_type,
                segments_left,
                type_data,
            },
            payload,
            backing: Some(backing),
        })
    }

    fn reset(&mut self) -> Result<()> {
        let length = 8 * (usize::from(self.extension_length) + 1);
        self.reset_at(0, length)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < header.length() {
            return Err(short_window(length, header.length()));
        }
        let backing = self.backing.as_mut().ok_or_else(missing_backing)?;
        let mut window = backing.slice_at(offset, header.length())?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}

pub(crate) fn decode_routing(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(RoutingBuilder::parse(memory)?))
}

// ---- Fragment ----

/// Fragment 扩展头长度（恒为 8 字节，无长度字段）。
pub const FRAGMENT_HEADER_LEN: usize = 8;

/// Fragment 扩展头：分片偏移 + M 标志 + 标识。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    /// 下一头部号。
    pub next_header: ProtocolId,
    /// 分片偏移（13 位，8 字节单位）。
    pub fragment_offset: u16,
    /// More Fragments 标志。
    pub more_fragments: bool,
    /// 分片标识。
    pub identification: u32,
}

impl FragmentHeader {
    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> FragmentBuilder {
        FragmentBuilder {
            next_header: Some(self.next_header),
            fragment_offset: self.fragment_offset,
            more_fragments: self.more_fragments,
            identification: Some(self.identification),
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8(self.next_header.number())?;
        memory.write_u8(0)?;
        memory.write_u16((self.fragment_offset << 3) | u16::from(self.more_fragments))?;
        memory.write_u32(self.identification)
    }
}

impl Header for FragmentHeader {
    fn length(&self) -> usize {
        FRAGMENT_HEADER_LEN
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(FRAGMENT_HEADER_LEN);
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// Fragment 报文。
#[derive(Debug)]
pub struct FragmentPacket {
    header: FragmentHeader,
    payload: Payload,
    backing: Option<Memory>,
}

impl FragmentPacket {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &FragmentHeader {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器。
    #[must_use]
    pub fn builder(&self) -> FragmentBuilder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for FragmentPacket {
    fn header_length(&self) -> usize {
        FRAGMENT_HEADER_LEN
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fragment 构建器。
#[derive(Debug, Clone, Default)]
pub struct FragmentBuilder {
    next_header: Option<ProtocolId>,
    fragment_offset: u16,
    more_fragments: bool,
    identification: Option<u32>,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl FragmentBuilder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定下一头部号。
    #[must_use]
    pub fn next_header(mut self, next_header: ProtocolId) -> Self {
        self.next_header = Some(next_header);
        self
    }

    /// 指定分片偏移（13 位，8 字节单位）。
    #[must_use]
    pub fn fragment_offset(mut self, fragment_offset: u16) -> Self {
        self.fragment_offset = fragment_offset;
        self
    }

    /// 指定 More Fragments 标志。
    #[must_use]
    pub fn more_fragments(mut self, more_fragments: bool) -> Self {
        self.more_fragments = more_fragments;
        self
    }

    /// 指定分片标识。
    #[must_use]
    pub fn identification(mut self, identification: u32) -> Self {
        self.identification = Some(identification);
        self
    }

    /// 指定载荷来源缓冲。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<FragmentHeader> {
        if self.fragment_offset > 0x1FFF {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                "分片偏移超出 13 位范围",
            ));
        }
        Ok(FragmentHeader {
            next_header: require(self.next_header, "next_header")?,
            fragment_offset: self.fragment_offset,
            more_fragments: self.more_fragments,
            identification: require(self.identification, "identification")?,
        })
    }
}

impl PacketBuilder for FragmentBuilder {
    type Packet = FragmentPacket;

    fn build(&self) -> Result<FragmentPacket> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(FragmentPacket {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<FragmentPacket> {
        if buffer.readable_bytes() < FRAGMENT_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("Fragment 头部不足 8 字节（剩余 {}）", buffer.readable_bytes()),
            ));
        }
        let start = buffer.reader_index();
        let next_header = ProtocolId::from_number(buffer.read_u8()?);
        let _reserved = buffer.read_u8()?;
        let offset_flags = buffer.read_u16()?;
        let identification = buffer.read_u32()?;
        let backing = buffer.slice_at(start, FRAGMENT_HEADER_LEN)?;
        let payload_memory = buffer.read_slice(buffer.readable_bytes())?;
        let payload = IP_DISPATCH.decode(next_header, payload_memory)?;
        Ok(FragmentPacket {
            header: FragmentHeader {
                next_header,
                fragment_offset: offset_flags >> 3,
                more_fragments: offset_flags & 0x1 != 0,
                identification,
            },
            payload,
            backing: Some(backing),
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.reset_at(0, FRAGMENT_HEADER_LEN)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < FRAGMENT_HEADER_LEN {
            return Err(short_window(length, FRAGMENT_HEADER_LEN));
        }
        let backing = self.backing.as_mut().ok_or_else(missing_backing)?;
        let mut window = backing.slice_at(offset, FRAGMENT_HEADER_LEN)?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}

pub(crate) fn decode_fragment(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(FragmentBuilder::parse(memory)?))
}

// ---- Authentication ----

/// Authentication 头部的固定前缀长度（字节）。
const AUTHENTICATION_FIXED_LEN: usize = 12;

/// Authentication 扩展头（RFC 4302）：SPI + 序列号 + ICV。
///
/// 长度字段以 4 字节为单位：总长 `(payload_length + 2) × 4`，
/// 与其余扩展头的 8 字节单位不同。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthenticationHeader {
    /// 下一头部号。
    pub next_header: ProtocolId,
    /// 长度字段（4 字节单位，总长减 2 个单位）。
    pub payload_length: u8,
    /// 安全参数索引。
    pub spi: u32,
    /// 抗重放序列号。
    pub sequence: u32,
    /// 完整性校验值（总长减 12 字节前缀）。
    pub icv: Vec<u8>,
}

impl AuthenticationHeader {
    /// 头部总长：`(payload_length + 2) × 4`，构建与解析共用。
    #[must_use]
    pub fn total_length(&self) -> usize {
        (usize::from(self.payload_length) + 2) * 4
    }

    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> AuthenticationBuilder {
        AuthenticationBuilder {
            next_header: Some(self.next_header),
            payload_length: self.payload_length,
            spi: Some(self.spi),
            sequence: Some(self.sequence),
            icv: self.icv.clone(),
            payload: None,
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u8(self.next_header.number())?;
        memory.write_u8(self.payload_length)?;
        memory.write_u16(0)?;
        memory.write_u32(self.spi)?;
        memory.write_u32(self.sequence)?;
        memory.write_bytes(&self.icv)
    }
}

impl Header for AuthenticationHeader {
    fn length(&self) -> usize {
        self.total_length()
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(self.total_length());
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// Authentication 报文。
#[derive(Debug)]
pub struct AuthenticationPacket {
    header: AuthenticationHeader,
    payload: Payload,
    backing: Option<Memory>,
}

impl AuthenticationPacket {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &AuthenticationHeader {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器。
    #[must_use]
    pub fn builder(&self) -> AuthenticationBuilder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for AuthenticationPacket {
    fn header_length(&self) -> usize {
        self.header.total_length()
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Authentication 构建器。
#[derive(Debug, Clone, Default)]
pub struct AuthenticationBuilder {
    next_header: Option<ProtocolId>,
    payload_length: u8,
    spi: Option<u32>,
    sequence: Option<u32>,
    icv: Vec<u8>,
    payload: Option<Memory>,
    backing: Option<Memory>,
}

impl AuthenticationBuilder {
    /// 创建空构建器。
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定下一头部号。
    #[must_use]
    pub fn next_header(mut self, next_header: ProtocolId) -> Self {
        self.next_header = Some(next_header);
        self
    }

    /// 指定长度字段（4 字节单位）。
    #[must_use]
    pub fn payload_length(mut self, payload_length: u8) -> Self {
        self.payload_length = payload_length;
        self
    }

    /// 指定安全参数索引。
    #[must_use]
    pub fn spi(mut self, spi: u32) -> Self {
        self.spi = Some(spi);
        self
    }

    /// 指定抗重放序列号。
    #[must_use]
    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// 指定 ICV（长度必须等于 `(payload_length + 2) × 4 − 12`）。
    #[must_use]
    pub fn icv(mut self, icv: Vec<u8>) -> Self {
        self.icv = icv;
        self
    }

    /// 指定载荷来源缓冲。
    #[must_use]
    pub fn payload(mut self, payload: Memory) -> Self {
        self.payload = Some(payload);
        self
    }

    fn header(&self) -> Result<AuthenticationHeader> {
        let total = (usize::from(self.payload_length) + 2) * 4;
        if total < AUTHENTICATION_FIXED_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                format!("Authentication 长度字段 {} 过小", self.payload_length),
            ));
        }
        let expected = total - AUTHENTICATION_FIXED_LEN;
        if self.icv.len() != expected {
            return Err(CoreError::new(
                codes::PROTOCOL_INVALID_FIELD,
                format!(
                    "ICV {} 字节与 payload_length {} 不符（应为 {expected}）",
                    self.icv.len(),
                    self.payload_length
                ),
            ));
        }
        Ok(AuthenticationHeader {
            next_header: require(self.next_header, "next_header")?,
            payload_length: self.payload_length,
            spi: require(self.spi, "spi")?,
            sequence: require(self.sequence, "sequence")?,
            icv: self.icv.clone(),
        })
    }
}

impl PacketBuilder for AuthenticationBuilder {
    type Packet = AuthenticationPacket;

    fn build(&self) -> Result<AuthenticationPacket> {
        let header = self.header()?;
        let payload = match &self.payload {
            Some(memory) if memory.is_readable() => Payload::Opaque(memory.duplicate()),
            _ => Payload::None,
        };
        Ok(AuthenticationPacket {
            header,
            payload,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<AuthenticationPacket> {
        if buffer.readable_bytes() < AUTHENTICATION_FIXED_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!(
                    "Authentication 头部不足 12 字节（剩余 {}）",
                    buffer.readable_bytes()
                ),
            ));
        }
        let start = buffer.reader_index();
        let next_header = ProtocolId::from_number(buffer.read_u8()?);
        let payload_length = buffer.read_u8()?;
        let total = (usize::from(payload_length) + 2) * 4;
        if total < AUTHENTICATION_FIXED_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("Authentication 声明长度 {payload_length} 非法"),
            ));
        }
        if buffer.readable_bytes() + 2 < total {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                format!("Authentication 声明总长 {total} 字节，缓冲不足"),
            ));
        }
        let _reserved = buffer.read_u16()?;
        let spi = buffer.read_u32()?;
        let sequence = buffer.read_u32()?;
        let mut icv = alloc::vec![0u8; total - AUTHENTICATION_FIXED_LEN];
        buffer.read_bytes(&mut icv)?;
        let backing = buffer.slice_at(start, total)?;
        let payload_memory = buffer.read_slice(buffer.readable_bytes())?;
        let payload = IP_DISPATCH.decode(next_header, payload_memory)?;
        Ok(AuthenticationPacket {
            header: AuthenticationHeader {
                next_header,
                payload_length,
                spi,
                sequence,
                icv,
            },
            payload,
            backing: Some(backing),
        })
    }

    fn reset(&mut self) -> Result<()> {
        let length = (usize::from(self.payload_length) + 2) * 4;
        self.reset_at(0, length)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < header.total_length() {
            return Err(short_window(length, header.total_length()));
        }
        let backing = self.backing.as_mut().ok_or_else(missing_backing)?;
        let mut window = backing.slice_at(offset, header.total_length())?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}

pub(crate) fn decode_authentication(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(AuthenticationBuilder::parse(memory)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `extension_length = 0` + 6 字节选项 → 8 字节线缆，重解析字段一致。
    #[test]
    fn hop_by_hop_minimal_round_trip() {
        let packet = HopByHopOptionsBuilder::new()
            .next_header(ProtocolId::Icmpv6)
            .extension_length(0)
            .options(alloc::vec![0x01, 0x04, 0, 0, 0, 0])
            .build()
            .expect("构建 Hop-by-Hop");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        assert_eq!(wire.readable_bytes(), 8, "2 字节前缀 + 6 字节选项应为 8 字节");

        let reparsed = HopByHopOptionsBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header().next_header(), ProtocolId::Icmpv6);
        assert_eq!(reparsed.header().options(), [0x01, 0x04, 0, 0, 0, 0]);
        assert_eq!(reparsed.header(), packet.header());
    }

    /// 选项字节数与长度字段不符时构建失败。
    #[test]
    fn mismatched_options_length_fails_build() {
        let err = DestinationOptionsBuilder::new()
            .next_header(ProtocolId::NoNextHeader)
            .extension_length(1)
            .options(alloc::vec![0; 6])
            .build()
            .expect_err("长度不符必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_INVALID_FIELD);
    }

    /// 多单位长度的选项头：总长公式在两条路径上一致。
    #[test]
    fn destination_options_two_units_round_trip() {
        let options = alloc::vec![0u8; 14];
        let packet = DestinationOptionsBuilder::new()
            .next_header(ProtocolId::Tcp)
            .extension_length(1)
            .options(options.clone())
            .build()
            .expect("构建 Destination Options");
        assert_eq!(packet.header().length(), 16);

        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let reparsed = DestinationOptionsBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header().extension().extension_length, 1);
        assert_eq!(reparsed.header().options(), &options[..]);
    }

    /// Routing 头部的四字节前缀 + 类型数据往返。
    #[test]
    fn routing_round_trip() {
        let packet = RoutingBuilder::new()
            .next_header(ProtocolId::Fragment)
            .extension_length(0)
            .routing_type(0)
            .segments_left(3)
            .type_data(alloc::vec![0, 0, 0, 0])
            .build()
            .expect("构建 Routing");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        assert_eq!(wire.readable_bytes(), 8);

        let reparsed = RoutingBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header());
        assert_eq!(reparsed.header().segments_left, 3);
    }

    /// Fragment：13 位偏移与 M 标志的位域打包。
    #[test]
    fn fragment_round_trip() {
        let packet = FragmentBuilder::new()
            .next_header(ProtocolId::Udp)
            .fragment_offset(185)
            .more_fragments(true)
            .identification(0xDEAD_BEEF)
            .build()
            .expect("构建 Fragment");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        assert_eq!(wire.readable_bytes(), FRAGMENT_HEADER_LEN);

        let reparsed = FragmentBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header());
        assert_eq!(reparsed.header().fragment_offset, 185);
        assert!(reparsed.header().more_fragments);
    }

    /// Authentication：4 字节单位长度与 ICV 往返。
    #[test]
    fn authentication_round_trip() {
        let packet = AuthenticationBuilder::new()
            .next_header(ProtocolId::Tcp)
            .payload_length(4)
            .spi(0x0000_1234)
            .sequence(7)
            .icv(alloc::vec![0xAB; 12])
            .build()
            .expect("构建 Authentication");
        assert_eq!(packet.header().total_length(), 24);

        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let reparsed = AuthenticationBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header());
    }

    /// reset 原地改写 Hop-by-Hop 的下一头部号。
    #[test]
    fn hop_by_hop_reset_in_place() {
        let packet = HopByHopOptionsBuilder::new()
            .next_header(ProtocolId::Icmpv6)
            .extension_length(0)
            .options(alloc::vec![0; 6])
            .build()
            .expect("构建");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let parsed = HopByHopOptionsBuilder::parse(&mut wire).expect("解析");

        let mut builder = parsed.builder().next_header(ProtocolId::NoNextHeader);
        builder.reset().expect("原地重写");

        wire.set_reader_index(0).expect("重读");
        let mutated = HopByHopOptionsBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(mutated.header().next_header(), ProtocolId::NoNextHeader);
    }

    /// 截断的选项头按解码错误报告（与 NDP 的停止策略不同，这里是硬错误）。
    #[test]
    fn truncated_options_header_fails_parse() {
        let mut wire = Memory::from_slice(&[58, 1, 0, 0, 0, 0, 0, 0]);
        let err = HopByHopOptionsBuilder::parse(&mut wire).expect_err("声明 16 字节但只有 8 字节");
        assert_eq!(err.code(), codes::PROTOCOL_DECODE);
    }
}
