//! `chain_contract` 集成测试：验证扩展头经进程级派发表的链式展开。
//!
//! # 测试目标（Why）
//! - 链式解析的正确性不止于单个头部：IPv6 固定头部 → Hop-by-Hop →
//!   Fragment → 终端载荷的逐层派生必须端到端可走通；
//! - 未注册协议号必须以不透明载荷终止链，而不是报错。

use tap_buffer::Memory;
use tap_codec_ip::{
    FragmentPacket, HopByHopOptionsPacket, Ipv6Builder, Ipv6Packet, register_defaults,
};
use tap_core::ProtocolId;
use tap_codecs::{PacketBuilder, PacketView, find_layer};

/// 手工拼装 IPv6 + Hop-by-Hop + Fragment + 4 字节终端载荷的线缆字节。
fn chained_wire() -> Memory {
    let mut wire = Memory::alloc(40 + 8 + 8 + 4);
    // IPv6 固定头部：版本 6，载荷 20 字节，下一头部 Hop-by-Hop。
    wire.write_u32(6 << 28).expect("版本字");
    wire.write_u16(20).expect("载荷长度");
    wire.write_u8(ProtocolId::HopByHopOptions.number()).expect("下一头部");
    wire.write_u8(64).expect("跳数");
    wire.write_bytes(&[0u8; 32]).expect("源/目的地址");
    // Hop-by-Hop：下一头部 Fragment，extension_length 0，PadN 选项。
    wire.write_u8(ProtocolId::Fragment.number()).expect("下一头部");
    wire.write_u8(0).expect("扩展长度");
    wire.write_bytes(&[0x01, 0x04, 0, 0, 0, 0]).expect("PadN 选项");
    // Fragment：下一头部 UDP（未注册），偏移 0，M=1，标识 0x42。
    wire.write_u8(ProtocolId::Udp.number()).expect("下一头部");
    wire.write_u8(0).expect("保留");
    wire.write_u16(0x0001).expect("偏移/标志（M=1）");
    wire.write_u32(0x42).expect("标识");
    // 终端载荷。
    wire.write_bytes(&[0xCA, 0xFE, 0xBA, 0xBE]).expect("终端载荷");
    wire.set_reader_index(0).expect("重置");
    wire
}

/// IPv6 → Hop-by-Hop → Fragment → 不透明载荷的全链展开与逐层查找。
#[test]
fn extension_chain_unfolds_via_dispatch() {
    register_defaults();
    let mut wire = chained_wire();
    let packet = Ipv6Builder::parse(&mut wire).expect("解析全链");

    assert_eq!(packet.header().next_header, ProtocolId::HopByHopOptions);

    let hop_by_hop =
        find_layer::<HopByHopOptionsPacket>(&packet).expect("链上应有 Hop-by-Hop 层");
    assert_eq!(hop_by_hop.header().next_header(), ProtocolId::Fragment);
    assert_eq!(hop_by_hop.header().options(), [0x01, 0x04, 0, 0, 0, 0]);

    let fragment = find_layer::<FragmentPacket>(&packet).expect("链上应有 Fragment 层");
    assert_eq!(fragment.header().identification, 0x42);
    assert!(fragment.header().more_fragments);

    // UDP 未注册：链以不透明载荷终止。
    let terminal = fragment.payload().as_opaque().expect("终端载荷保持不透明");
    assert_eq!(terminal.readable_to_vec(), [0xCA, 0xFE, 0xBA, 0xBE]);

    // 自顶向下逐层查找也能命中本层。
    assert!(find_layer::<Ipv6Packet>(&packet).is_some());
}
