fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc so builds do not depend on a system install
    std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    let well_known = protoc_bin_vendored::include_path()?;

    let protos = [
        "proto/sf/firehose/v2/firehose.proto",
        "proto/sf/ethereum/type/v2/type.proto",
        "proto/sf/ethereum/transform/v1/transforms.proto",
        "proto/firehose/events/v1/events.proto",
    ];

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&protos, &[std::path::PathBuf::from("proto"), well_known])?;

    for proto in protos {
        println!("cargo:rerun-if-changed={proto}");
    }
    Ok(())
}
