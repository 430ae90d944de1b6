fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/btc_xmr_swap/v1/asb.proto"], &["proto"])?;

    Ok(())
}
