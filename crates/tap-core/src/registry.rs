//! 协议号映射与可读名称注册表。
//!
//! # 教案定位（Why）
//! - 报文链式解析依赖“头部字段中的数字 → 下一层协议”的派发；派发键必须
//!   是全函数映射：未知值不应使解析链断裂；
//! - 可读名称（ICMP 类型名、ARP 操作名等）需要在运行期开放注册，
//!   以支撑私有协议与实验性类型号。
//!
//! # 使用契约（What）
//! - [`ProtocolId`] / [`EtherType`]：封闭枚举 + `Other(n)`，`from_number`
//!   与 `number` 互为逆映射，对任意输入都成功；
//! - [`NameRegistry`]：`register` 插入或覆盖，`name_of` 查询缺失时返回
//!   [`UNKNOWN`] 哨兵，永不失败。
//!
//! # 设计考量（How）
//! - 派发键用封闭枚举而非动态表，使匹配编译期可穷举；动态性只保留在
//!   名称侧表中，由 `spin::RwLock` 守护，读多写少。

use alloc::{borrow::Cow, vec::Vec};
use core::fmt;

use spin::RwLock;

/// 注册表查询缺失时返回的哨兵描述。
pub const UNKNOWN: &str = "UNKNOWN";

/// IPv4 protocol / IPv6 next-header 字段的协议号。
///
/// # 契约说明（What）
/// - 覆盖本套件派发所需的已知协议号；其余值一律落入 `Other(n)`；
/// - `from_number`/`number` 构成全函数往返：任何 `u8` 都有唯一表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolId {
    /// IPv6 Hop-by-Hop Options 扩展头（0）。
    HopByHopOptions,
    /// ICMPv4（1）。
    Icmp,
    /// TCP（6）。
    Tcp,
    /// UDP（17）。
    Udp,
    /// IPv6 封装（41）。
    Ipv6,
    /// IPv6 Routing 扩展头（43）。
    Routing,
    /// IPv6 Fragment 扩展头（44）。
    Fragment,
    /// Encapsulating Security Payload（50）。
    EncapsulatingSecurityPayload,
    /// Authentication Header（51）。
    Authentication,
    /// ICMPv6（58）。
    Icmpv6,
    /// No Next Header（59），载荷链终止。
    NoNextHeader,
    /// IPv6 Destination Options 扩展头（60）。
    DestinationOptions,
    /// 未在上述清单中的协议号。
    Other(u8),
}

impl ProtocolId {
    /// 将线缆上的协议号映射为枚举值；未知值落入 `Other`。
    #[must_use]
    pub const fn from_number(number: u8) -> Self {
        match number {
            0 => Self::HopByHopOptions,
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            41 => Self::Ipv6,
            43 => Self::Routing,
            44 => Self::Fragment,
            50 => Self::EncapsulatingSecurityPayload,
            51 => Self::Authentication,
            58 => Self::Icmpv6,
            59 => Self::NoNextHeader,
            60 => Self::DestinationOptions,
            other => Self::Other(other),
        }
    }

    /// 返回线缆表示的协议号。
    #[must_use]
    pub const fn number(&self) -> u8 {
        match self {
            Self::HopByHopOptions => 0,
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Ipv6 => 41,
            Self::Routing => 43,
            Self::Fragment => 44,
            Self::EncapsulatingSecurityPayload => 50,
            Self::Authentication => 51,
            Self::Icmpv6 => 58,
            Self::NoNextHeader => 59,
            Self::DestinationOptions => 60,
            Self::Other(other) => *other,
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HopByHopOptions => f.write_str("IPv6 Hop-by-Hop Options"),
            Self::Icmp => f.write_str("ICMPv4"),
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
            Self::Ipv6 => f.write_str("IPv6"),
            Self::Routing => f.write_str("IPv6 Routing"),
            Self::Fragment => f.write_str("IPv6 Fragment"),
            Self::EncapsulatingSecurityPayload => f.write_str("ESP"),
            Self::Authentication => f.write_str("Authentication Header"),
            Self::Icmpv6 => f.write_str("ICMPv6"),
            Self::NoNextHeader => f.write_str("No Next Header"),
            Self::DestinationOptions => f.write_str("IPv6 Destination Options"),
            Self::Other(number) => write!(f, "{UNKNOWN} (0x{number:02x})"),
        }
    }
}

/// 以太网帧类型字段（EtherType）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    /// IPv4（0x0800）。
    Ipv4,
    /// ARP（0x0806）。
    Arp,
    /// IPv6（0x86DD）。
    Ipv6,
    /// 未在上述清单中的帧类型。
    Other(u16),
}

impl EtherType {
    /// 将线缆上的帧类型映射为枚举值；未知值落入 `Other`。
    #[must_use]
    pub const fn from_number(number: u16) -> Self {
        match number {
            0x0800 => Self::Ipv4,
            0x0806 => Self::Arp,
            0x86DD => Self::Ipv6,
            other => Self::Other(other),
        }
    }

    /// 返回线缆表示的帧类型值。
    #[must_use]
    pub const fn number(&self) -> u16 {
        match self {
            Self::Ipv4 => 0x0800,
            Self::Arp => 0x0806,
            Self::Ipv6 => 0x86DD,
            Self::Other(other) => *other,
        }
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("IPv4"),
            Self::Arp => f.write_str("ARP"),
            Self::Ipv6 => f.write_str("IPv6"),
            Self::Other(number) => write!(f, "{UNKNOWN} (0x{number:04x})"),
        }
    }
}

/// `NameRegistry` 是“数字键 → 可读描述”的运行期注册表。
///
/// # 设计背景（Why）
/// - ICMP 类型/代码目录、ARP 操作目录等需要在进程初始化时播种标准条目，
///   并允许调用方在运行期补充私有条目；
/// - 查询端永远不应因缺失而失败：诊断输出宁可显示 `UNKNOWN`，
///   也不能让解析链中断。
///
/// # 行为逻辑（How）
/// - 条目保存在按键有序的向量中，二分查找；`register` 对同键覆盖；
/// - 读写通过 `spin::RwLock` 守护，满足“多读者、偶发写者”的使用画像。
///
/// # 契约说明（What）
/// - **前置条件**：键类型需 `Ord + Copy`；
/// - **后置条件**：`name_of` 总是返回一个描述，缺失时为 [`UNKNOWN`]。
pub struct NameRegistry<K> {
    entries: RwLock<Vec<(K, Cow<'static, str>)>>,
}

impl<K: Ord + Copy> NameRegistry<K> {
    /// 创建空注册表；`const` 以便用于 `static` 播种场景。
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 注册（或覆盖）一个条目。
    pub fn register(&self, key: K, name: impl Into<Cow<'static, str>>) {
        let mut entries = self.entries.write();
        match entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(index) => entries[index].1 = name.into(),
            Err(index) => entries.insert(index, (key, name.into())),
        }
    }

    /// 查询键对应的描述；缺失时返回 [`UNKNOWN`] 哨兵，永不失败。
    #[must_use]
    pub fn name_of(&self, key: K) -> Cow<'static, str> {
        let entries = self.entries.read();
        match entries.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(index) => entries[index].1.clone(),
            Err(_) => Cow::Borrowed(UNKNOWN),
        }
    }

    /// 判断键是否已注册。
    #[must_use]
    pub fn contains(&self, key: K) -> bool {
        let entries = self.entries.read();
        entries.binary_search_by_key(&key, |(k, _)| *k).is_ok()
    }

    /// 返回当前条目数量，供统计与测试使用。
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// 判断注册表是否为空。
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K: Ord + Copy> Default for NameRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_number_round_trip_is_total() {
        for number in 0..=u8::MAX {
            let id = ProtocolId::from_number(number);
            assert_eq!(id.number(), number, "协议号 {number} 的往返映射不一致");
        }
    }

    #[test]
    fn unknown_lookup_yields_sentinel() {
        let registry: NameRegistry<u16> = NameRegistry::new();
        assert_eq!(registry.name_of(42), UNKNOWN);
    }

    #[test]
    fn register_overwrites_existing_entry() {
        let registry: NameRegistry<u16> = NameRegistry::new();
        registry.register(1, "ARP Request");
        registry.register(1, "ARP Request (updated)");
        assert_eq!(registry.name_of(1), "ARP Request (updated)");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn composite_keys_are_supported() {
        let registry: NameRegistry<(u8, u8)> = NameRegistry::new();
        registry.register((3, 1), "Destination Unreachable: Host Unreachable");
        assert!(registry.contains((3, 1)));
        assert_eq!(registry.name_of((3, 0)), UNKNOWN);
    }
}
