#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

//! # tap-codec-arp
//!
//! ## 教案目的（Why）
//! - **定位**：Address Resolution Protocol（RFC 826）的 EN10MB/IPv4 形态
//!   编解码：28 字节定长报文的解析、构造与原地重写。
//! - **架构角色**：链路层派发表中 `EtherType::Arp` 的解码入口；
//!   作为定长协议，它同时是整个 Packet/Header/Builder 契约最小的
//!   参考实现。
//!
//! ## 交互契约（What）
//! - [`ArpBuilder::build`] 要求全部字段就位，缺失即
//!   `protocol.missing_field`；
//! - [`ArpBuilder::parse`] 消费 28 字节定长前缀，尾随字节（以太网填充）
//!   以不透明载荷保留；
//! - [`ArpBuilder::reset`] 把字段写回解析来源的后备缓冲，不重新分配。
//!
//! ## 实现策略（How）
//! - 操作码目录沿用名称注册表：标准条目在首次访问时播种，
//!   运行期可注册私有操作码，未知值查询得到 `UNKNOWN`。

extern crate alloc;

use alloc::borrow::Cow;
use alloc::boxed::Box;
use core::any::Any;
use core::net::Ipv4Addr;

use spin::Once;

use tap_buffer::Memory;
use tap_core::{CoreError, EtherType, NameRegistry, Result, codes};
use tap_codecs::net::{self, MacAddress};
use tap_codecs::{Dispatcher, Header, PacketBuilder, PacketView, Payload};

/// EN10MB/IPv4 形态的 ARP 报文定长（字节）。
pub const ARP_HEADER_LEN: usize = 28;

/// 以太网硬件类型号。
pub const HARDWARE_TYPE_ETHERNET: u16 = 1;

/// ARP 请求操作码。
pub const OPERATION_REQUEST: u16 = 1;

/// ARP 应答操作码。
pub const OPERATION_REPLY: u16 = 2;

static OPERATION_NAMES: Once<NameRegistry<u16>> = Once::new();

fn operation_registry() -> &'static NameRegistry<u16> {
    OPERATION_NAMES.call_once(|| {
        let registry = NameRegistry::new();
        registry.register(OPERATION_REQUEST, "ARP Request");
        registry.register(OPERATION_REPLY, "ARP Reply");
        registry.register(3, "RARP Request");
        registry.register(4, "RARP Reply");
        registry.register(8, "InARP Request");
        registry.register(9, "InARP Reply");
        registry
    })
}

/// 查询操作码的可读名称；未知值返回 `UNKNOWN`。
#[must_use]
pub fn operation_name(operation: u16) -> Cow<'static, str> {
    operation_registry().name_of(operation)
}

/// 运行期注册（或覆盖）一个操作码名称。
pub fn register_operation(operation: u16, name: &'static str) {
    operation_registry().register(operation, name);
}

/// 把 ARP 解码器注册进指定的链路层派发表。
pub fn register_defaults(dispatcher: &Dispatcher<EtherType>) {
    dispatcher.register(EtherType::Arp, decode);
}

fn decode(memory: &mut Memory) -> Result<Box<dyn PacketView>> {
    Ok(Box::new(ArpBuilder::parse(memory)?))
}

/// ARP 头部：EN10MB/IPv4 形态的全部字段。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArpHeader {
    /// 硬件类型（以太网为 1）。
    pub hardware_type: u16,
    /// 协议类型（IPv4 为 `EtherType::Ipv4`）。
    pub protocol_type: EtherType,
    /// 硬件地址长度（以太网为 6）。
    pub hardware_address_length: u8,
    /// 协议地址长度（IPv4 为 4）。
    pub protocol_address_length: u8,
    /// 操作码，见 [`operation_name`] 目录。
    pub operation: u16,
    /// 发送方硬件地址。
    pub sender_hardware_address: MacAddress,
    /// 发送方协议地址。
    pub sender_protocol_address: Ipv4Addr,
    /// 目标硬件地址。
    pub target_hardware_address: MacAddress,
    /// 目标协议地址。
    pub target_protocol_address: Ipv4Addr,
}

impl ArpHeader {
    /// 返回以本头部字段预填充的构建器（不携带后备缓冲）。
    #[must_use]
    pub fn builder(&self) -> ArpBuilder {
        ArpBuilder {
            hardware_type: self.hardware_type,
            protocol_type: self.protocol_type,
            operation: Some(self.operation),
            sender_hardware_address: Some(self.sender_hardware_address),
            sender_protocol_address: Some(self.sender_protocol_address),
            target_hardware_address: Some(self.target_hardware_address),
            target_protocol_address: Some(self.target_protocol_address),
            backing: None,
        }
    }

    fn write_into(&self, memory: &mut Memory) -> Result<()> {
        memory.write_u16(self.hardware_type)?;
        memory.write_u16(self.protocol_type.number())?;
        memory.write_u8(self.hardware_address_length)?;
        memory.write_u8(self.protocol_address_length)?;
        memory.write_u16(self.operation)?;
        self.sender_hardware_address.write_to(memory)?;
        net::write_ipv4(memory, &self.sender_protocol_address)?;
        self.target_hardware_address.write_to(memory)?;
        net::write_ipv4(memory, &self.target_protocol_address)
    }
}

impl Header for ArpHeader {
    fn length(&self) -> usize {
        ARP_HEADER_LEN
    }

    fn to_memory(&self) -> Result<Memory> {
        let mut memory = Memory::alloc(ARP_HEADER_LEN);
        self.write_into(&mut memory)?;
        Ok(memory)
    }
}

/// ARP 报文：头部 + 尾随字节（以太网填充等）。
#[derive(Debug)]
pub struct ArpPacket {
    header: ArpHeader,
    payload: Payload,
    backing: Option<Memory>,
}

impl ArpPacket {
    /// 头部视图。
    #[must_use]
    pub fn header(&self) -> &ArpHeader {
        &self.header
    }

    /// 返回预填充且携带后备缓冲的构建器，供原地重写使用。
    #[must_use]
    pub fn builder(&self) -> ArpBuilder {
        let mut builder = self.header.builder();
        builder.backing = self.backing.as_ref().map(Memory::duplicate);
        builder
    }
}

impl PacketView for ArpPacket {
    fn header_length(&self) -> usize {
        ARP_HEADER_LEN
    }

    fn payload(&self) -> &Payload {
        &self.payload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// ARP 构建器：字段暂存 + 可选的后备缓冲。
///
/// 硬件/协议地址长度由 EN10MB/IPv4 形态固定为 6/4，不作为暂存字段。
#[derive(Debug, Clone)]
pub struct ArpBuilder {
    hardware_type: u16,
    protocol_type: EtherType,
    operation: Option<u16>,
    sender_hardware_address: Option<MacAddress>,
    sender_protocol_address: Option<Ipv4Addr>,
    target_hardware_address: Option<MacAddress>,
    target_protocol_address: Option<Ipv4Addr>,
    backing: Option<Memory>,
}

impl Default for ArpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArpBuilder {
    /// 创建空构建器（硬件类型与协议类型预置为 EN10MB/IPv4）。
    #[must_use]
    pub fn new() -> Self {
        Self {
            hardware_type: HARDWARE_TYPE_ETHERNET,
            protocol_type: EtherType::Ipv4,
            operation: None,
            sender_hardware_address: None,
            sender_protocol_address: None,
            target_hardware_address: None,
            target_protocol_address: None,
            backing: None,
        }
    }

    /// 指定操作码。
    #[must_use]
    pub fn operation(mut self, operation: u16) -> Self {
        self.operation = Some(operation);
        self
    }

    /// 指定发送方硬件地址。
    #[must_use]
    pub fn sender_hardware_address(mut self, address: MacAddress) -> Self {
        self.sender_hardware_address = Some(address);
        self
    }

    /// 指定发送方协议地址。
    #[must_use]
    pub fn sender_protocol_address(mut self, address: Ipv4Addr) -> Self {
        self.sender_protocol_address = Some(address);
        self
    }

    /// 指定目标硬件地址。
    #[must_use]
    pub fn target_hardware_address(mut self, address: MacAddress) -> Self {
        self.target_hardware_address = Some(address);
        self
    }

    /// 指定目标协议地址。
    #[must_use]
    pub fn target_protocol_address(mut self, address: Ipv4Addr) -> Self {
        self.target_protocol_address = Some(address);
        self
    }

    fn header(&self) -> Result<ArpHeader> {
        Ok(ArpHeader {
            hardware_type: self.hardware_type,
            protocol_type: self.protocol_type,
            hardware_address_length: MacAddress::LENGTH as u8,
            protocol_address_length: 4,
            operation: require(self.operation, "operation")?,
            sender_hardware_address: require(self.sender_hardware_address, "sender_hardware_address")?,
            sender_protocol_address: require(self.sender_protocol_address, "sender_protocol_address")?,
            target_hardware_address: require(self.target_hardware_address, "target_hardware_address")?,
            target_protocol_address: require(self.target_protocol_address, "target_protocol_address")?,
        })
    }
}

impl PacketBuilder for ArpBuilder {
    type Packet = ArpPacket;

    fn build(&self) -> Result<ArpPacket> {
        let header = self.header()?;
        Ok(ArpPacket {
            header,
            payload: Payload::None,
            backing: self.backing.as_ref().map(Memory::duplicate),
        })
    }

    fn parse(buffer: &mut Memory) -> Result<ArpPacket> {
        if buffer.readable_bytes() < ARP_HEADER_LEN {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                alloc::format!(
                    "ARP 报文不足 {ARP_HEADER_LEN} 字节（剩余 {}）",
                    buffer.readable_bytes()
                ),
            ));
        }
        let backing = buffer.slice_at(buffer.reader_index(), ARP_HEADER_LEN)?;
        let hardware_type = buffer.read_u16()?;
        let protocol_type = EtherType::from_number(buffer.read_u16()?);
        let hardware_address_length = buffer.read_u8()?;
        let protocol_address_length = buffer.read_u8()?;
        if hardware_address_length as usize != MacAddress::LENGTH || protocol_address_length != 4 {
            return Err(CoreError::new(
                codes::PROTOCOL_DECODE,
                alloc::format!(
                    "非 EN10MB/IPv4 形态的地址长度：hlen={hardware_address_length}, plen={protocol_address_length}"
                ),
            ));
        }
        let operation = buffer.read_u16()?;
        let sender_hardware_address = MacAddress::read_from(buffer)?;
        let sender_protocol_address = net::read_ipv4(buffer)?;
        let target_hardware_address = MacAddress::read_from(buffer)?;
        let target_protocol_address = net::read_ipv4(buffer)?;
        let payload = if buffer.is_readable() {
            Payload::Opaque(buffer.read_slice(buffer.readable_bytes())?)
        } else {
            Payload::None
        };
        Ok(ArpPacket {
            header: ArpHeader {
                hardware_type,
                protocol_type,
                hardware_address_length,
                protocol_address_length,
                operation,
                sender_hardware_address,
                sender_protocol_address,
                target_hardware_address,
                target_protocol_address,
            },
            payload,
            backing: Some(backing),
        })
    }

    fn reset(&mut self) -> Result<()> {
        self.reset_at(0, ARP_HEADER_LEN)
    }

    fn reset_at(&mut self, offset: usize, length: usize) -> Result<()> {
        let header = self.header()?;
        if length < ARP_HEADER_LEN {
            return Err(CoreError::new(
                codes::BUFFER_OUT_OF_BOUNDS,
                alloc::format!("重写区间 {length} 字节不足以容纳 {ARP_HEADER_LEN} 字节头部"),
            ));
        }
        let backing = self.backing.as_mut().ok_or_else(|| {
            CoreError::new(codes::PROTOCOL_MISSING_FIELD, "构建器未携带后备缓冲，无法原地重写")
        })?;
        let mut window = backing.slice_at(offset, ARP_HEADER_LEN)?;
        window.set_writer_index(0)?;
        header.write_into(&mut window)
    }
}

fn require<T>(field: Option<T>, name: &'static str) -> Result<T> {
    field.ok_or_else(|| {
        CoreError::new(
            codes::PROTOCOL_MISSING_FIELD,
            alloc::format!("必填字段缺失：{name}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_codecs::find_layer;

    fn sample_builder() -> ArpBuilder {
        ArpBuilder::new()
            .operation(OPERATION_REQUEST)
            .sender_hardware_address(MacAddress::new([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]))
            .sender_protocol_address(Ipv4Addr::new(192, 168, 0, 1))
            .target_hardware_address(MacAddress::ZERO)
            .target_protocol_address(Ipv4Addr::new(192, 168, 0, 199))
    }

    /// EN10MB/IPv4 请求报文：构建 28 字节，重解析后字段与哈希一致。
    #[test]
    fn build_then_parse_round_trip() {
        let packet = sample_builder().build().expect("构建 ARP 报文");
        let mut wire = packet.header().to_memory().expect("计算规范缓冲");
        assert_eq!(wire.readable_bytes(), ARP_HEADER_LEN, "ARP 报文应为 28 字节");
        assert_eq!(
            wire.readable_to_vec(),
            hex::decode("0001080006040001deadbeef0001c0a80001000000000000c0a800c7")
                .expect("线缆夹具"),
            "线缆布局必须与 RFC 826 一致"
        );

        let reparsed = ArpBuilder::parse(&mut wire).expect("重解析");
        assert_eq!(reparsed.header(), packet.header(), "字段必须逐项一致");
        assert_eq!(
            hash_of(reparsed.header()),
            hash_of(packet.header()),
            "哈希必须一致"
        );
        assert_eq!(
            reparsed.header().to_memory().expect("重建缓冲").readable_to_vec(),
            packet.header().to_memory().expect("原缓冲").readable_to_vec(),
            "线缆字节必须一致"
        );
    }

    /// 解析后经构建器原地重写，修改在后备缓冲中生效且可再次解析。
    #[test]
    fn reset_rewrites_backing_in_place() {
        let packet = sample_builder().build().expect("构建");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let parsed = ArpBuilder::parse(&mut wire).expect("解析");

        let mut builder = parsed.builder().operation(OPERATION_REPLY);
        builder.reset().expect("原地重写");

        wire.set_reader_index(0).expect("重读同一缓冲");
        let mutated = ArpBuilder::parse(&mut wire).expect("重写后再次解析");
        assert_eq!(mutated.header().operation, OPERATION_REPLY, "重写必须落在原缓冲");
        assert_eq!(
            mutated.header().sender_protocol_address,
            parsed.header().sender_protocol_address,
            "未修改字段保持不变"
        );
    }

    /// 相同字段的 reset 是幂等的：重写后再次构建得到相同头部。
    #[test]
    fn reset_with_same_fields_is_idempotent() {
        let packet = sample_builder().build().expect("构建");
        let mut wire = packet.header().to_memory().expect("规范缓冲");
        let parsed = ArpBuilder::parse(&mut wire).expect("解析");
        let before = wire.to_vec(0, ARP_HEADER_LEN).expect("原始字节");

        let mut builder = parsed.builder();
        builder.reset().expect("同字段重写");
        let rebuilt = builder.build().expect("重写后构建");

        assert_eq!(rebuilt.header(), parsed.header());
        assert_eq!(wire.to_vec(0, ARP_HEADER_LEN).expect("重写后字节"), before);
    }

    #[test]
    fn missing_field_fails_build() {
        let err = ArpBuilder::new().build().expect_err("缺字段必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_MISSING_FIELD);
    }

    #[test]
    fn truncated_wire_fails_parse() {
        let mut wire = Memory::from_slice(&[0u8; 27]);
        let err = ArpBuilder::parse(&mut wire).expect_err("27 字节必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_DECODE);
    }

    #[test]
    fn trailing_padding_is_kept_opaque() {
        let packet = sample_builder().build().expect("构建");
        let mut padded = Memory::alloc(ARP_HEADER_LEN + 4);
        padded
            .write_bytes(&packet.header().to_memory().expect("缓冲").readable_to_vec())
            .expect("写入报文");
        padded.write_bytes(&[0, 0, 0, 0]).expect("写入填充");
        padded.set_reader_index(0).expect("重置");
        let parsed = ArpBuilder::parse(&mut padded).expect("解析");
        let padding = parsed.payload().as_opaque().expect("填充应保留为不透明载荷");
        assert_eq!(padding.readable_bytes(), 4);
        assert!(find_layer::<ArpPacket>(&parsed).is_some(), "链上可按类型找到本层");
    }

    #[test]
    fn operation_catalog_resolves_and_extends() {
        assert_eq!(operation_name(OPERATION_REQUEST), "ARP Request");
        assert_eq!(operation_name(0x7777), tap_core::UNKNOWN);
        register_operation(0x7777, "Vendor Probe");
        assert_eq!(operation_name(0x7777), "Vendor Probe");
    }

    fn hash_of(header: &ArpHeader) -> u64 {
        use core::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        header.hash(&mut hasher);
        hasher.finish()
    }
}
