//! 链路层/网络层地址类型与缓冲读写辅助。
//!
//! 地址本体沿用 `core::net`（`Ipv4Addr`/`Ipv6Addr`）；本模块补充 MAC
//! 地址类型与“从 [`Memory`] 游标读写地址”的统一入口，供各 codec 复用。

use core::fmt;
use core::net::{Ipv4Addr, Ipv6Addr};
use core::str::FromStr;

use tap_buffer::Memory;
use tap_core::Result;

/// 48 位以太网硬件地址。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// 线缆长度（字节）。
    pub const LENGTH: usize = 6;

    /// 全零地址。
    pub const ZERO: Self = Self([0; 6]);

    /// 广播地址 `ff:ff:ff:ff:ff:ff`。
    pub const BROADCAST: Self = Self([0xFF; 6]);

    /// 由六个八位组构造。
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// 返回八位组数组。
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// 是否为广播地址。
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// 组播位（首八位组最低位）。
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// 从缓冲的读游标处读取 6 字节地址。
    pub fn read_from(memory: &mut Memory) -> Result<Self> {
        let mut octets = [0u8; 6];
        memory.read_bytes(&mut octets)?;
        Ok(Self(octets))
    }

    /// 把地址写入缓冲的写游标处。
    pub fn write_to(&self, memory: &mut Memory) -> Result<()> {
        memory.write_bytes(&self.0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for MacAddress {
    // 诊断输出里地址始终保持冒号十六进制形态。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// MAC 地址文本解析错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacParseError {
    /// 八位组数量不是 6。
    InvalidLength,
    /// 某个八位组不是两位十六进制。
    InvalidOctet,
}

impl fmt::Display for MacParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => f.write_str("MAC 地址必须由 6 个八位组构成"),
            Self::InvalidOctet => f.write_str("MAC 地址八位组必须是两位十六进制"),
        }
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(text: &str) -> core::result::Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in text.split(':') {
            if count == 6 {
                return Err(MacParseError::InvalidLength);
            }
            if part.len() != 2 {
                return Err(MacParseError::InvalidOctet);
            }
            octets[count] =
                u8::from_str_radix(part, 16).map_err(|_| MacParseError::InvalidOctet)?;
            count += 1;
        }
        if count != 6 {
            return Err(MacParseError::InvalidLength);
        }
        Ok(Self(octets))
    }
}

/// 从读游标处读取 IPv4 地址。
pub fn read_ipv4(memory: &mut Memory) -> Result<Ipv4Addr> {
    let mut octets = [0u8; 4];
    memory.read_bytes(&mut octets)?;
    Ok(Ipv4Addr::from(octets))
}

/// 把 IPv4 地址写入写游标处。
pub fn write_ipv4(memory: &mut Memory, address: &Ipv4Addr) -> Result<()> {
    memory.write_bytes(&address.octets())
}

/// 从读游标处读取 IPv6 地址。
pub fn read_ipv6(memory: &mut Memory) -> Result<Ipv6Addr> {
    let mut octets = [0u8; 16];
    memory.read_bytes(&mut octets)?;
    Ok(Ipv6Addr::from(octets))
}

/// 把 IPv6 地址写入写游标处。
pub fn write_ipv6(memory: &mut Memory, address: &Ipv6Addr) -> Result<()> {
    memory.write_bytes(&address.octets())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn mac_parse_and_display_round_trip() {
        let mac: MacAddress = "de:ad:be:ef:00:2a".parse().expect("解析 MAC");
        assert_eq!(mac.octets(), [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x2A]);
        assert_eq!(mac.to_string(), "de:ad:be:ef:00:2a");
    }

    #[test]
    fn malformed_mac_is_rejected() {
        assert_eq!(
            "de:ad:be:ef:00".parse::<MacAddress>(),
            Err(MacParseError::InvalidLength)
        );
        assert_eq!(
            "de:ad:be:ef:00:zz".parse::<MacAddress>(),
            Err(MacParseError::InvalidOctet)
        );
        assert_eq!(
            "de:ad:be:ef:00:2a:11".parse::<MacAddress>(),
            Err(MacParseError::InvalidLength)
        );
    }

    #[test]
    fn addresses_round_trip_through_memory() {
        let mut memory = Memory::alloc(26);
        MacAddress::BROADCAST.write_to(&mut memory).expect("写 MAC");
        write_ipv4(&mut memory, &Ipv4Addr::new(192, 168, 0, 1)).expect("写 IPv4");
        write_ipv6(&mut memory, &Ipv6Addr::LOCALHOST).expect("写 IPv6");
        memory.set_reader_index(0).expect("重置读游标");
        assert!(MacAddress::read_from(&mut memory).expect("读 MAC").is_broadcast());
        assert_eq!(
            read_ipv4(&mut memory).expect("读 IPv4"),
            Ipv4Addr::new(192, 168, 0, 1)
        );
        assert_eq!(read_ipv6(&mut memory).expect("读 IPv6"), Ipv6Addr::LOCALHOST);
    }
}
