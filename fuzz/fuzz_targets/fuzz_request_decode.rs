#![no_main]
use libfuzzer_sys::fuzz_target;
use std::net::SocketAddr;

fuzz_target!(|data: &[u8]| {
    let addr = SocketAddr::from(([127, 0, 0, 1], 50055));
    if let Ok(req) = dpdce_core::rpc::decode_request(addr, data) {
        let _ = dpdce_core::rpc::encode_success(&req.id, req.params);
    }
});
