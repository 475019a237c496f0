//! NDP TLV 选项（RFC 4861 §4.6）。
//!
//! # 教案定位（Why）
//! - 邻居发现消息（RS/RA/NS/NA/Redirect）尾部是 TLV 选项列表：
//!   类型 1 字节 + 长度 1 字节（8 字节单位，含头两字节）+ 载荷；
//! - 列表以缓冲耗尽为终止条件；**声明长度为 0 或载荷超出剩余缓冲时，
//!   解析就地停止并返回已累积的选项，不报错**——这是既定的截断停止
//!   策略，必须原样保留并以测试锁定。
//!
//! # 使用契约（What）
//! - [`parse_options`] 永不失败；
//! - [`write_options`] 对字段化选项写出标准布局，对
//!   [`NdpOption::Unknown`] 要求 `2 + data.len()` 为 8 的倍数。

use alloc::format;
use alloc::vec::Vec;
use core::net::Ipv6Addr;

use tap_buffer::Memory;
use tap_core::{CoreError, Result, codes};
use tap_codecs::net::MacAddress;

/// Source Link-Layer Address 选项类型号。
pub const OPTION_SOURCE_LINK_LAYER: u8 = 1;
/// Target Link-Layer Address 选项类型号。
pub const OPTION_TARGET_LINK_LAYER: u8 = 2;
/// Prefix Information 选项类型号。
pub const OPTION_PREFIX_INFORMATION: u8 = 3;
/// Redirected Header 选项类型号。
pub const OPTION_REDIRECTED_HEADER: u8 = 4;
/// MTU 选项类型号。
pub const OPTION_MTU: u8 = 5;

/// Prefix Information 选项（RFC 4861 §4.6.2）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefixInformation {
    /// 前缀有效位数。
    pub prefix_length: u8,
    /// On-link 标志（L）。
    pub on_link: bool,
    /// 自治地址配置标志（A）。
    pub autonomous: bool,
    /// 有效生存期（秒）。
    pub valid_lifetime: u32,
    /// 首选生存期（秒）。
    pub preferred_lifetime: u32,
    /// 前缀本体。
    pub prefix: Ipv6Addr,
}

/// NDP TLV 选项。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NdpOption {
    /// 发送方链路层地址。
    SourceLinkLayerAddress(MacAddress),
    /// 目标链路层地址。
    TargetLinkLayerAddress(MacAddress),
    /// 前缀信息。
    PrefixInformation(PrefixInformation),
    /// 重定向报文携带的原始头部片段。
    RedirectedHeader(Vec<u8>),
    /// 链路 MTU。
    Mtu(u32),
    /// 未识别的选项：原样保留类型号与载荷。
    Unknown {
        /// 选项类型号。
        kind: u8,
        /// 选项载荷（不含类型/长度两字节）。
        data: Vec<u8>,
    },
}

impl NdpOption {
    /// 选项类型号。
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            Self::SourceLinkLayerAddress(_) => OPTION_SOURCE_LINK_LAYER,
            Self::TargetLinkLayerAddress(_) => OPTION_TARGET_LINK_LAYER,
            Self::PrefixInformation(_) => OPTION_PREFIX_INFORMATION,
            Self::RedirectedHeader(_) => OPTION_REDIRECTED_HEADER,
            Self::Mtu(_) => OPTION_MTU,
            Self::Unknown { kind, .. } => *kind,
        }
    }

    /// 选项总长（字节，8 的倍数）。
    pub fn wire_length(&self) -> Result<usize> {
        Ok(match self {
            Self::SourceLinkLayerAddress(_) | Self::TargetLinkLayerAddress(_) => 8,
            Self::PrefixInformation(_) => 32,
            Self::Mtu(_) => 8,
            Self::RedirectedHeader(data) => {
                if data.len() % 8 != 0 {
                    return Err(CoreError::new(
                        codes::PROTOCOL_INVALID_FIELD,
                        format!("Redirected Header 数据 {} 字节必须为 8 的倍数", data.len()),
                    ));
                }
                8 + data.len()
            }
            Self::Unknown { kind, data } => {
                let total = 2 + data.len();
                if total % 8 != 0 {
                    return Err(CoreError::new(
                        codes::PROTOCOL_INVALID_FIELD,
                        format!("选项 {kind} 总长 {total} 字节必须为 8 的倍数"),
                    ));
                }
                total
            }
        })
    }
}

/// 解析 TLV 选项列表，直至缓冲耗尽或命中截断停止条件。
///
/// # 契约说明
/// - **后置条件**：返回已成功解析的选项序列；
/// - **截断停止**：剩余不足 2 字节、声明长度为 0、或声明载荷超出剩余
///   缓冲时，停止解析并返回已累积结果——不是错误。
#[must_use]
pub fn parse_options(buffer: &mut Memory) -> Vec<NdpOption> {
    let mut options = Vec::new();
    loop {
        if buffer.readable_bytes() < 2 {
            return options;
        }
        let reader = buffer.reader_index();
        let Ok(kind) = buffer.get_u8(reader) else {
            return options;
        };
        let Ok(length_units) = buffer.get_u8(reader + 1) else {
            return options;
        };
        if length_units == 0 {
            // 零长度选项永远无法前进，按截断停止策略返回既有结果。
            return options;
        }
        let total = usize::from(length_units) * 8;
        if buffer.readable_bytes() < total {
            return options;
        }
        // 前置检查已保证区间有效，以下读取不会失败。
        let Some(option) = read_option(buffer, kind, total) else {
            return options;
        };
        options.push(option);
    }
}

fn read_option(buffer: &mut Memory, kind: u8, total: usize) -> Option<NdpOption> {
    buffer.skip_bytes(2).ok()?;
    let mut data = alloc::vec![0u8; total - 2];
    buffer.read_bytes(&mut data).ok()?;
    Some(decode_option(kind, data))
}

fn decode_option(kind: u8, data: Vec<u8>) -> NdpOption {
    match kind {
        OPTION_SOURCE_LINK_LAYER if data.len() == 6 => {
            NdpOption::SourceLinkLayerAddress(mac_from(&data))
        }
        OPTION_TARGET_LINK_LAYER if data.len() == 6 => {
            NdpOption::TargetLinkLayerAddress(mac_from(&data))
        }
        OPTION_PREFIX_INFORMATION if data.len() == 30 => {
            let mut prefix = [0u8; 16];
            prefix.copy_from_slice(&data[14..30]);
            NdpOption::PrefixInformation(PrefixInformation {
                prefix_length: data[0],
                on_link: data[1] & 0x80 != 0,
                autonomous: data[1] & 0x40 != 0,
                valid_lifetime: u32::from_be_bytes([data[2], data[3], data[4], data[5]]),
                preferred_lifetime: u32::from_be_bytes([data[6], data[7], data[8], data[9]]),
                prefix: Ipv6Addr::from(prefix),
            })
        }
        OPTION_REDIRECTED_HEADER if data.len() >= 6 => {
            NdpOption::RedirectedHeader(data[6..].to_vec())
        }
        OPTION_MTU if data.len() == 6 => {
            NdpOption::Mtu(u32::from_be_bytes([data[2], data[3], data[4], data[5]]))
        }
        _ => NdpOption::Unknown { kind, data },
    }
}

fn mac_from(data: &[u8]) -> MacAddress {
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&data[..6]);
    MacAddress::new(octets)
}

/// 选项列表的线缆总长。
pub fn options_wire_length(options: &[NdpOption]) -> Result<usize> {
    let mut total = 0;
    for option in options {
        total += option.wire_length()?;
    }
    Ok(total)
}

/// 把选项列表写入缓冲的写游标处。
pub fn write_options(buffer: &mut Memory, options: &[NdpOption]) -> Result<()> {
    for option in options {
        let total = option.wire_length()?;
        buffer.write_u8(option.kind())?;
        buffer.write_u8((total / 8) as u8)?;
        match option {
            NdpOption::SourceLinkLayerAddress(mac) | NdpOption::TargetLinkLayerAddress(mac) => {
                mac.write_to(buffer)?;
            }
            NdpOption::PrefixInformation(info) => {
                buffer.write_u8(info.prefix_length)?;
                let flags = (u8::from(info.on_link) << 7) | (u8::from(info.autonomous) << 6);
                buffer.write_u8(flags)?;
                buffer.write_u32(info.valid_lifetime)?;
                buffer.write_u32(info.preferred_lifetime)?;
                buffer.write_u32(0)?;
                buffer.write_bytes(&info.prefix.octets())?;
            }
            NdpOption::RedirectedHeader(data) => {
                buffer.write_bytes(&[0u8; 6])?;
                buffer.write_bytes(data)?;
            }
            NdpOption::Mtu(mtu) => {
                buffer.write_u16(0)?;
                buffer.write_u32(*mtu)?;
            }
            NdpOption::Unknown { data, .. } => {
                buffer.write_bytes(data)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_fixture() -> Vec<NdpOption> {
        alloc::vec![
            NdpOption::SourceLinkLayerAddress(MacAddress::new([1, 2, 3, 4, 5, 6])),
            NdpOption::Mtu(1500),
            NdpOption::PrefixInformation(PrefixInformation {
                prefix_length: 64,
                on_link: true,
                autonomous: true,
                valid_lifetime: 2_592_000,
                preferred_lifetime: 604_800,
                prefix: "2001:db8::".parse().expect("前缀"),
            }),
        ]
    }

    /// 写出 → 解析的选项往返。
    #[test]
    fn options_round_trip() {
        let options = options_fixture();
        let total = options_wire_length(&options).expect("总长");
        assert_eq!(total, 8 + 8 + 32);
        let mut wire = Memory::alloc(total);
        write_options(&mut wire, &options).expect("写出");
        wire.set_reader_index(0).expect("重置");
        assert_eq!(parse_options(&mut wire), options);
    }

    /// 声明长度为 0 的条目触发截断停止：返回其前累积的选项，不报错。
    #[test]
    fn zero_length_option_stops_without_error() {
        let options = options_fixture();
        let healthy = options_wire_length(&options).expect("总长");
        let mut wire = Memory::alloc(healthy + 8);
        write_options(&mut wire, &options).expect("写出");
        wire.write_u8(OPTION_MTU).expect("坏条目类型");
        wire.write_u8(0).expect("坏条目长度 0");
        wire.write_bytes(&[0; 6]).expect("坏条目残骸");
        wire.set_reader_index(0).expect("重置");
        let parsed = parse_options(&mut wire);
        assert_eq!(parsed, options, "应返回坏条目之前的全部选项");
    }

    /// 载荷超出剩余缓冲的条目同样触发截断停止。
    #[test]
    fn overrunning_option_stops_without_error() {
        let mut wire = Memory::alloc(12);
        write_options(
            &mut wire,
            &[NdpOption::TargetLinkLayerAddress(MacAddress::ZERO)],
        )
        .expect("写出合法条目");
        wire.write_u8(OPTION_PREFIX_INFORMATION).expect("类型");
        wire.write_u8(4).expect("声明 32 字节但缓冲只剩 2 字节");
        wire.set_reader_index(0).expect("重置");
        let parsed = parse_options(&mut wire);
        assert_eq!(parsed.len(), 1);
        assert!(matches!(parsed[0], NdpOption::TargetLinkLayerAddress(_)));
    }

    /// 未识别类型保留原始载荷，且总长对齐校验在写出侧生效。
    #[test]
    fn unknown_option_round_trips_raw() {
        let option = NdpOption::Unknown {
            kind: 14,
            data: alloc::vec![0xAA; 6],
        };
        let mut wire = Memory::alloc(8);
        write_options(&mut wire, core::slice::from_ref(&option)).expect("写出");
        wire.set_reader_index(0).expect("重置");
        assert_eq!(parse_options(&mut wire), [option]);

        let misaligned = NdpOption::Unknown {
            kind: 14,
            data: alloc::vec![0xAA; 5],
        };
        let err = options_wire_length(core::slice::from_ref(&misaligned))
            .expect_err("未对齐必须失败");
        assert_eq!(err.code(), codes::PROTOCOL_INVALID_FIELD);
    }
}
