// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generates the `coredns.dns.DnsService` gRPC server and client.
//!
//! The service is declared manually so the build does not need `protoc`;
//! the single `DnsPacket` message is defined in `src/rpc.rs` with `prost` derives.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let dns_service = tonic_build::manual::Service::builder()
        .name("DnsService")
        .package("coredns.dns")
        .method(
            tonic_build::manual::Method::builder()
                .name("query")
                .route_name("Query")
                .input_type("crate::rpc::DnsPacket")
                .output_type("crate::rpc::DnsPacket")
                .codec_path("tonic::codec::ProstCodec")
                .build(),
        )
        .build();

    tonic_build::manual::Builder::new().compile(&[dns_service]);
}
