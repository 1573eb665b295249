#![no_main]

use bitstream::BitBuffer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buffer = BitBuffer::from_bytes(data);
    let mut idx = 0usize;

    // Input bytes pick a bounded sequence of reads.
    while idx < data.len() && idx < 1024 {
        let op = data[idx] % 5;
        idx += 1;

        match op {
            0 => {
                let _ = buffer.read_bool();
            }
            1 => {
                let bits = data[idx.saturating_sub(1)] % 33;
                let _ = buffer.read(bits);
            }
            2 => {
                let _ = buffer.read_var_uint();
            }
            3 => {
                let _ = buffer.read_var_int();
            }
            _ => {
                let _ = buffer.skip(usize::from(data[idx.saturating_sub(1)] % 17));
            }
        }
    }
});
