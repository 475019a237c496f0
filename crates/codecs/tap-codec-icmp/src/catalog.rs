//! ICMPv4 / ICMPv6 类型-代码目录。
//!
//! # 教案定位（Why）
//! - 诊断输出需要把 `(type, code)` 组合翻译为可读名称；目录在首次访问
//!   时播种标准条目，运行期开放注册私有/实验性组合；
//! - 查询永不失败：未登记组合解析为 `UNKNOWN` 哨兵。

use alloc::borrow::Cow;

use spin::Once;

use tap_core::NameRegistry;

static ICMP4_NAMES: Once<NameRegistry<(u8, u8)>> = Once::new();
static ICMP6_NAMES: Once<NameRegistry<(u8, u8)>> = Once::new();

fn icmp4_registry() -> &'static NameRegistry<(u8, u8)> {
    ICMP4_NAMES.call_once(|| {
        let registry = NameRegistry::new();
        registry.register((0, 0), "Echo Reply");
        registry.register((3, 0), "Destination Unreachable: Network Unreachable");
        registry.register((3, 1), "Destination Unreachable: Host Unreachable");
        registry.register((3, 2), "Destination Unreachable: Protocol Unreachable");
        registry.register((3, 3), "Destination Unreachable: Port Unreachable");
        registry.register((3, 4), "Destination Unreachable: Fragmentation Needed");
        registry.register((3, 5), "Destination Unreachable: Source Route Failed");
        registry.register((5, 0), "Redirect: Network");
        registry.register((5, 1), "Redirect: Host");
        registry.register((8, 0), "Echo Request");
        registry.register((11, 0), "Time Exceeded: TTL Expired In Transit");
        registry.register((11, 1), "Time Exceeded: Fragment Reassembly Time Exceeded");
        registry.register((12, 0), "Parameter Problem: Pointer Indicates Error");
        registry
    })
}

fn icmp6_registry() -> &'static NameRegistry<(u8, u8)> {
    ICMP6_NAMES.call_once(|| {
        let registry = NameRegistry::new();
        registry.register((1, 0), "Destination Unreachable: No Route");
        registry.register((1, 1), "Destination Unreachable: Administratively Prohibited");
        registry.register((1, 3), "Destination Unreachable: Address Unreachable");
        registry.register((1, 4), "Destination Unreachable: Port Unreachable");
        registry.register((2, 0), "Packet Too Big");
        registry.register((3, 0), "Time Exceeded: Hop Limit Exceeded");
        registry.register((3, 1), "Time Exceeded: Fragment Reassembly Time Exceeded");
        registry.register((4, 0), "Parameter Problem: Erroneous Header Field");
        registry.register((4, 1), "Parameter Problem: Unrecognized Next Header");
        registry.register((4, 2), "Parameter Problem: Unrecognized IPv6 Option");
        registry.register((128, 0), "Echo Request");
        registry.register((129, 0), "Echo Reply");
        registry.register((133, 0), "Router Solicitation");
        registry.register((134, 0), "Router Advertisement");
        registry.register((135, 0), "Neighbor Solicitation");
        registry.register((136, 0), "Neighbor Advertisement");
        registry.register((137, 0), "Redirect");
        registry
    })
}

/// 查询 ICMPv4 `(type, code)` 的可读名称；未登记返回 `UNKNOWN`。
#[must_use]
pub fn icmp4_name(icmp_type: u8, code: u8) -> Cow<'static, str> {
    icmp4_registry().name_of((icmp_type, code))
}

/// 运行期注册（或覆盖）一个 ICMPv4 条目。
pub fn register_icmp4(icmp_type: u8, code: u8, name: &'static str) {
    icmp4_registry().register((icmp_type, code), name);
}

/// 查询 ICMPv6 `(type, code)` 的可读名称；未登记返回 `UNKNOWN`。
#[must_use]
pub fn icmp6_name(icmp_type: u8, code: u8) -> Cow<'static, str> {
    icmp6_registry().name_of((icmp_type, code))
}

/// 运行期注册（或覆盖）一个 ICMPv6 条目。
pub fn register_icmp6(icmp_type: u8, code: u8, name: &'static str) {
    icmp6_registry().register((icmp_type, code), name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tap_core::UNKNOWN;

    #[test]
    fn standard_entries_are_seeded() {
        assert_eq!(icmp4_name(8, 0), "Echo Request");
        assert_eq!(icmp6_name(135, 0), "Neighbor Solicitation");
    }

    #[test]
    fn unknown_combination_yields_sentinel() {
        assert_eq!(icmp4_name(200, 7), UNKNOWN);
        assert_eq!(icmp6_name(250, 9), UNKNOWN);
    }

    #[test]
    fn runtime_registration_extends_catalog() {
        register_icmp4(253, 0, "RFC3692 Experiment 1");
        assert_eq!(icmp4_name(253, 0), "RFC3692 Experiment 1");
    }
}
