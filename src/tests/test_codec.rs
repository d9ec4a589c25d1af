use crate::codec::*;
use crate::*;
use rand::Rng;

const ORDERS: [(ByteOrder, WordOrder); 4] = [
    (ByteOrder::Big, WordOrder::Big),
    (ByteOrder::Big, WordOrder::Little),
    (ByteOrder::Little, WordOrder::Big),
    (ByteOrder::Little, WordOrder::Little),
];

#[test]
fn test_scaled_round_trip() {
    let mut rng = rand::thread_rng();
    for scale in [1u32, 10, 100, 1000] {
        let max = f64::from(u16::MAX) / f64::from(scale);
        for _ in 0..1000 {
            let value: f64 = rng.gen_range(0.0, max);
            let word = encode_scaled(value, scale).unwrap();
            let decoded = decode_scaled(word, scale).unwrap();
            assert!(
                (decoded - value).abs() <= 0.5 / f64::from(scale),
                "{} -> {} -> {} (scale {})",
                value,
                word,
                decoded,
                scale
            );
        }
    }
}

#[test]
fn test_scaled_signed_round_trip() {
    let mut rng = rand::thread_rng();
    for _ in 0..1000 {
        let value: f64 = rng.gen_range(-3276.8, 3276.7);
        let word = encode_scaled_signed(value, 10).unwrap();
        let decoded = decode_scaled_signed(word, 10).unwrap();
        assert!((decoded - value).abs() <= 0.05 + f64::EPSILON * 4096.0);
    }
}

#[test]
fn test_float_round_trip_all_orders() {
    let mut rng = rand::thread_rng();
    for (bo, wo) in ORDERS {
        for _ in 0..1000 {
            let value: f32 = rng.gen_range(-1.0e6, 1.0e6);
            let regs = encode_f32(f64::from(value), bo, wo, FloatPolicy::default()).unwrap();
            assert_eq!(
                decode_f32(regs, bo, wo, FloatPolicy::default()).unwrap(),
                f64::from(value)
            );
        }
    }
}

#[test]
fn test_float_extremes_all_orders() {
    let subnormal = f32::from_bits(1);
    for (bo, wo) in ORDERS {
        for value in [f32::MAX, f32::MIN, f32::MIN_POSITIVE, subnormal, -subnormal, -0.0, 0.0] {
            let regs = encode_f32(f64::from(value), bo, wo, FloatPolicy::default()).unwrap();
            assert_eq!(
                u32_to_registers(value.to_bits(), bo, wo),
                regs,
                "{:e} ({:?}/{:?})",
                value,
                bo,
                wo
            );
            let decoded = decode_f32(regs, bo, wo, FloatPolicy::default()).unwrap();
            // bit-exact, sign of zero included
            assert_eq!((decoded as f32).to_bits(), value.to_bits());
        }
    }
}

#[test]
fn test_float_order_combinations_differ() {
    let encoded: Vec<[u16; 2]> = ORDERS
        .iter()
        .map(|(bo, wo)| encode_f32(230.5, *bo, *wo, FloatPolicy::default()).unwrap())
        .collect();
    for i in 0..encoded.len() {
        for j in i + 1..encoded.len() {
            assert_ne!(encoded[i], encoded[j]);
        }
    }
}

#[test]
fn test_float_rounds_to_nearest_single() {
    let regs = encode_f32(0.1, ByteOrder::Big, WordOrder::Big, FloatPolicy::default()).unwrap();
    assert_eq!(regs, [0x3DCC, 0xCCCD]);
    let decoded = decode_f32(regs, ByteOrder::Big, WordOrder::Big, FloatPolicy::default()).unwrap();
    assert_eq!(decoded, f64::from(0.1f32));
    assert_ne!(decoded, 0.1);
}

#[test]
fn test_u32_word_order() {
    assert_eq!(
        u32_to_registers(0x1122_3344, ByteOrder::Big, WordOrder::Big),
        [0x1122, 0x3344]
    );
    assert_eq!(
        u32_to_registers(0x1122_3344, ByteOrder::Big, WordOrder::Little),
        [0x3344, 0x1122]
    );
    assert_eq!(
        registers_to_u32([0x4433, 0x2211], ByteOrder::Little, WordOrder::Little),
        0x1122_3344
    );
}

#[test]
fn test_encoding_through_store() {
    let mut store = DenseStore::new(100, 8).unwrap();
    let float = Encoding::float32(ByteOrder::Big, WordOrder::Little);
    store.set_measurement(100, 23.7, &float).unwrap();
    assert_eq!(store.read_holdings(100, 2).unwrap(), vec![0x999A, 0x41BD]);
    assert_eq!(
        store.get_measurement(100, &float).unwrap(),
        f64::from(23.7f32)
    );
    // second register would be outside the block
    assert_eq!(
        store.set_measurement(107, 1.0, &float),
        Err(ErrorKind::IllegalDataAddress)
    );
    assert_eq!(store.get_holding(107).unwrap(), 0);
    assert_eq!(
        store.set_measurement(102, -1.0, &Encoding::scaled(10)),
        Err(ErrorKind::ValueOutOfRange)
    );
    store
        .set_measurement(102, -50.0, &Encoding::scaled_signed(10))
        .unwrap();
    assert_eq!(store.get_holding(102).unwrap(), 0xFE0C);
}
