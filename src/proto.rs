pub mod v1 {
    tonic::include_proto!("btc_xmr_swap.v1");
}
