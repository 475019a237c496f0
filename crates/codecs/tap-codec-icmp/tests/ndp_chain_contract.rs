//! `ndp_chain_contract` 集成测试：IPv6 层经派发表抵达 ICMPv6/NDP 的
//! 端到端链路，以及截断停止策略在全链中的表现。

use tap_buffer::Memory;
use tap_codec_icmp::{
    Icmp6Body, Icmp6Builder, Icmp6Packet, NdpOption, register_defaults as register_icmp,
};
use tap_codec_ip::{Ipv6Builder, register_defaults as register_ip};
use tap_core::ProtocolId;
use tap_codecs::net::MacAddress;
use tap_codecs::{Header, PacketBuilder, PacketView, find_layer};

fn registered() {
    register_ip();
    register_icmp();
}

/// IPv6 → ICMPv6 邻居请求的全链解析与选项提取。
#[test]
fn ipv6_chain_reaches_neighbor_solicitation() {
    registered();
    let source = "fe80::1".parse().expect("源");
    let destination = "ff02::1:ffc7:0".parse().expect("目的");
    let ns = Icmp6Builder::new()
        .message(Icmp6Body::NeighborSolicitation {
            target: "fe80::c7".parse().expect("目标"),
            options: vec![NdpOption::SourceLinkLayerAddress(MacAddress::new([
                2, 0, 0, 0, 0, 1,
            ]))],
        })
        .pseudo_header(source, destination)
        .calculate_checksum(true)
        .build()
        .expect("构建 NS");
    let ns_bytes = ns.to_memory().expect("NS 线缆").readable_to_vec();

    let ipv6 = Ipv6Builder::new()
        .next_header(ProtocolId::Icmpv6)
        .hop_limit(255)
        .source(source)
        .destination(destination)
        .payload(Memory::from_slice(&ns_bytes))
        .build()
        .expect("构建 IPv6");

    let mut wire = Memory::alloc(40 + ns_bytes.len());
    wire.write_bytes(
        &ipv6
            .header()
            .to_memory()
            .expect("IPv6 头部")
            .readable_to_vec(),
    )
    .expect("写 IPv6 头部");
    wire.write_bytes(&ns_bytes).expect("写 NS");
    wire.set_reader_index(0).expect("重置");

    let parsed = Ipv6Builder::parse(&mut wire).expect("解析全链");
    let icmp = find_layer::<Icmp6Packet>(&parsed).expect("链上应有 ICMPv6 层");
    assert_eq!(icmp.header().icmp_type, 135);
    assert!(
        icmp.is_valid_checksum(Some((&source, &destination)))
            .expect("验证"),
        "经 IPv6 链解析后校验和仍然有效"
    );
    let Icmp6Body::NeighborSolicitation { options, .. } = icmp.body() else {
        panic!("消息体类型不符");
    };
    assert_eq!(options.len(), 1);
}

/// 坏 TLV 条目在全链中同样触发截断停止：外层解析不报错。
#[test]
fn truncated_option_does_not_break_the_chain() {
    registered();
    let source = "fe80::1".parse().expect("源");
    let destination = "fe80::2".parse().expect("目的");
    let rs = Icmp6Builder::new()
        .message(Icmp6Body::RouterSolicitation { options: vec![] })
        .pseudo_header(source, destination)
        .calculate_checksum(true)
        .build()
        .expect("构建 RS");
    let mut message = rs.to_memory().expect("RS 线缆").readable_to_vec();
    // 追加声明长度为 0 的坏条目。
    message.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0]);

    let mut wire = Memory::alloc(40 + message.len());
    let ipv6 = Ipv6Builder::new()
        .next_header(ProtocolId::Icmpv6)
        .hop_limit(255)
        .source(source)
        .destination(destination)
        .payload_length(message.len() as u16)
        .build()
        .expect("构建 IPv6");
    wire.write_bytes(
        &ipv6
            .header()
            .to_memory()
            .expect("IPv6 头部")
            .readable_to_vec(),
    )
    .expect("写 IPv6 头部");
    wire.write_bytes(&message).expect("写 RS");
    wire.set_reader_index(0).expect("重置");

    let parsed = Ipv6Builder::parse(&mut wire).expect("截断停止不是错误");
    let icmp = find_layer::<Icmp6Packet>(&parsed).expect("链上应有 ICMPv6 层");
    assert!(icmp.body().options().is_empty(), "坏条目之前没有选项");
    let residue = icmp.payload().as_opaque().expect("残留字节保留为载荷");
    assert_eq!(residue.readable_bytes(), 8);
}
