#![no_main]

use bitstream::BitBuffer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buffer = BitBuffer::from_bytes(data);
    let _ = wire::decode_commands::<i32>(&mut buffer);
});
