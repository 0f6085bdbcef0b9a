fn main() -> Result<(), Box<dyn std::error::Error>> {
    let descriptor_path = std::path::PathBuf::from(std::env::var("OUT_DIR")?)
        .join("envoy_ratelimit_descriptor.bin");

    // The vendored tree is trimmed to what the service exchanges with Envoy:
    // rls.proto is the compilation root and pulls in the descriptor, header
    // and rate limit unit definitions.
    let protos = [
        "proto/envoy/service/ratelimit/v3/rls.proto",
        "proto/envoy/extensions/common/ratelimit/v3/ratelimit.proto",
        "proto/envoy/config/core/v3/base.proto",
        "proto/envoy/type/v3/ratelimit_unit.proto",
    ];
    for proto in &protos {
        println!("cargo:rerun-if-changed={}", proto);
    }

    // protoc isn't available in this build environment, so the descriptor
    // set is parsed in pure Rust via protox instead of shelling out.
    // protox pulls in its own prost/prost-types versions, so the descriptor
    // set is re-encoded and decoded through this crate's prost-types to get
    // the type tonic_build::compile_fds expects.
    let fds = protox::compile(&protos, ["proto"])?;
    let fds = <prost_types::FileDescriptorSet as prost::Message>::decode(
        &*<protox_prost_types::FileDescriptorSet as protox_prost::Message>::encode_to_vec(&fds),
    )?;

    // The descriptor set feeds gRPC reflection; only the server side is
    // generated.
    tonic_build::configure()
        .build_client(false)
        .file_descriptor_set_path(descriptor_path)
        .compile_fds(fds)?;

    Ok(())
}
