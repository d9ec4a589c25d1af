#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use meter_rtu::{DenseStore, Responder, ResponderConfig, SparseStore};

#[derive(Debug, Arbitrary)]
enum FuzzLayout {
    Dense { base: u16, len: u8 },
    Sparse { seeded: Vec<u16> },
}

#[derive(Debug, Arbitrary)]
struct FuzzInput<'a> {
    unit_id: u8,
    layout: FuzzLayout,
    request_buf: &'a [u8],
}

fuzz_target!(|data: FuzzInput| {
    // only panics matter, invalid unit ids are rejected by the constructor
    let _ = fuzz_responder(data);
});

fn fuzz_responder(input: FuzzInput) -> Result<(), meter_rtu::ErrorKind> {
    let mut responder = Responder::new(&ResponderConfig::new(input.unit_id))?;
    let response = match input.layout {
        FuzzLayout::Dense { base, len } => {
            let mut store = DenseStore::new(base, u32::from(len))?;
            responder.process_frame(input.request_buf, &mut store)
        }
        FuzzLayout::Sparse { seeded } => {
            let mut store = SparseStore::new();
            for reg in seeded {
                store.seed(reg, reg);
            }
            responder.process_frame(input.request_buf, &mut store)
        }
    };
    if let Some(response) = response {
        assert!(response.len() >= 5);
        assert!(meter_rtu::frame::decode(&response).is_ok());
    }
    Ok(())
}
