use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    bitstreams::{BinaryReader, BinaryWriterBuilder},
    error::Error,
    properties::DecoderOptions,
    utils::encodings::{UniversalCode, VarLenUint8},
};

use super::{
    alias::AliasTable,
    code::decode_histograms,
    context_map::{decode_context_map, inverse_move_to_front, move_to_front, verify_context_map, write_context_map_simple},
    encoder::{distance_code, normalize_counts, write_histogram, EncoderParams, EntropyEncoder, Token},
    histogram::read_histogram,
    hybrid_uint::HybridUintConfig,
    lz77::{special_distance, Lz77Params},
    reader::{AnsSymbolReader, DecodedStream},
    ANS_LOG_TAB_SIZE, ANS_TAB_SIZE,
};

fn to_reader(writer: BinaryWriterBuilder) -> BinaryReader {
    BinaryReader::new(writer.build().os)
}

fn encode(tokens: &[Token], num_contexts: usize, params: EncoderParams) -> (BinaryReader, usize) {
    let encoder = EntropyEncoder::builder(num_contexts).set_params(params).build(tokens).unwrap();
    let mut writer = BinaryWriterBuilder::new();
    encoder.write(&mut writer).unwrap();
    (to_reader(writer), encoder.num_tokens())
}

fn options(params: &EncoderParams) -> DecoderOptions {
    DecoderOptions { distance_multiplier: params.distance_multiplier, disallow_lz77: false }
}

fn assert_roundtrip(tokens: &[Token], num_contexts: usize, params: EncoderParams) -> usize {
    let (mut reader, coded) = encode(tokens, num_contexts, params);
    let contexts: Vec<usize> = tokens.iter().map(|t| t.context as usize).collect();

    let decoded = DecodedStream::decode_all(&mut reader, num_contexts, &contexts, &options(&params)).unwrap();
    let expected: Vec<u32> = tokens.iter().map(|t| t.value).collect();
    assert_eq!(decoded.values, expected);
    coded
}

fn random_tokens(seed: u64, n: usize, num_contexts: u32, max_value: u32) -> Vec<Token> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let ctx = rng.gen_range(0..num_contexts);
            // Skewed per context so that histograms differ.
            let v = rng.gen_range(0..=max_value) >> rng.gen_range(0..(ctx + 4).min(31));
            Token::new(ctx, v)
        })
        .collect()
}

#[test]
fn test_simple_histogram_one_symbol() {
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(1, 1);
    writer.push_bits(0, 1);
    VarLenUint8::write_next(&mut writer, 5);

    let counts = read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)).unwrap();
    assert_eq!(counts, vec![0, 0, 0, 0, 0, 4096]);
}

#[test]
fn test_simple_histogram_two_symbols() {
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(1, 1);
    writer.push_bits(1, 1);
    VarLenUint8::write_next(&mut writer, 3);
    VarLenUint8::write_next(&mut writer, 0);
    writer.push_bits(1000, 12);

    let counts = read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)).unwrap();
    assert_eq!(counts, vec![3096, 0, 0, 1000]);
}

#[test]
fn test_simple_histogram_equal_symbols() {
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(1, 1);
    writer.push_bits(1, 1);
    VarLenUint8::write_next(&mut writer, 2);
    VarLenUint8::write_next(&mut writer, 2);
    writer.push_bits(1000, 12);

    assert!(matches!(read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)), Err(Error::CorruptHistogram(_))));
}

#[test]
fn test_flat_histogram() {
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(0, 1);
    writer.push_bits(1, 1);
    VarLenUint8::write_next(&mut writer, 3);
    writer.push_bits(0, 1);
    writer.push_bits(1, 1);
    VarLenUint8::write_next(&mut writer, 2);

    let mut reader = to_reader(writer);
    assert_eq!(read_histogram(ANS_LOG_TAB_SIZE, &mut reader).unwrap(), vec![1024; 4]);
    assert_eq!(read_histogram(ANS_LOG_TAB_SIZE, &mut reader).unwrap(), vec![1366, 1365, 1365]);
}

/// Non-simple, non-flat histogram header with shift 13 and `length` entries.
fn general_header(writer: &mut BinaryWriterBuilder, length: u32) {
    writer.push_bits(0, 1);
    writer.push_bits(0, 1);
    writer.push_bits(0b111, 3);
    writer.push_bits(6, 3);
    VarLenUint8::write_next(writer, length - 3);
}

#[test]
fn test_general_histogram_over_subscribed() {
    let mut writer = BinaryWriterBuilder::new();
    general_header(&mut writer, 3);
    // Logcount 12 three times: the first is omitted, the other two are >= 2048 each.
    for _ in 0..3 {
        writer.push_bits(1, 7);
    }
    writer.push_bits(0, 11);
    writer.push_bits(0, 11);

    assert!(matches!(read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)), Err(Error::InvalidHistogramCount)));
}

#[test]
fn test_general_histogram_rle_after_omitted() {
    let mut writer = BinaryWriterBuilder::new();
    general_header(&mut writer, 6);
    writer.push_bits(1, 7);
    // RLE escape, run of 4.
    writer.push_bits(65, 7);
    VarLenUint8::write_next(&mut writer, 0);

    assert!(matches!(read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)), Err(Error::CorruptHistogram(_))));
}

#[test]
fn test_general_histogram_invalid_shift() {
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(0, 1);
    writer.push_bits(0, 1);
    writer.push_bits(0b111, 3);
    writer.push_bits(7, 3);

    assert!(matches!(read_histogram(ANS_LOG_TAB_SIZE, &mut to_reader(writer)), Err(Error::InvalidShift(14))));
}

#[test]
fn test_written_histograms_read_back() {
    let histograms: Vec<Vec<u32>> = vec![
        vec![4096],
        vec![0, 0, 0, 4096],
        vec![1, 4095],
        vec![1024; 4],
        // Run of five 200s starting at 2, right after the count it repeats.
        vec![1000, 200, 200, 200, 200, 200, 200, 1896],
        vec![0, 0, 0, 0, 0, 1, 2000, 2095],
        normalize_counts(&(1..=200u64).map(|i| i * i % 37 + 1).collect::<Vec<_>>(), ANS_LOG_TAB_SIZE),
    ];

    let mut writer = BinaryWriterBuilder::new();
    for h in histograms.iter() {
        write_histogram(h, &mut writer).unwrap();
    }

    let mut reader = to_reader(writer);
    for h in histograms.iter() {
        let mut decoded = read_histogram(ANS_LOG_TAB_SIZE, &mut reader).unwrap();
        let len = decoded.iter().rposition(|&c| c != 0).map_or(0, |p| p + 1);
        decoded.truncate(len);
        assert_eq!(&decoded, h);
    }
}

#[test]
fn test_write_histogram_rejects_bad_sum() {
    let mut writer = BinaryWriterBuilder::new();
    assert!(matches!(write_histogram(&[100, 200], &mut writer), Err(Error::InvalidEncoderInput(_))));
}

#[test]
fn test_normalize_counts() {
    let counts = normalize_counts(&[1, 0, 1_000_000, 3, 0, 0], ANS_LOG_TAB_SIZE);
    assert_eq!(counts.len(), 4);
    assert_eq!(counts.iter().sum::<u32>(), ANS_TAB_SIZE);
    assert!(counts[0] >= 1 && counts[3] >= 1);
    assert_eq!(counts[1], 0);

    assert!(normalize_counts(&[0, 0], ANS_LOG_TAB_SIZE).is_empty());
    assert_eq!(normalize_counts(&[0, 7], ANS_LOG_TAB_SIZE), vec![0, 4096]);
}

#[test]
fn test_alias_table_covers_every_slot() {
    let counts = [1000, 7, 0, 2000, 1089];
    for log_alpha_size in [5, 6, 8] {
        let table = AliasTable::build(&counts, ANS_TAB_SIZE, log_alpha_size).unwrap();
        let log_entry_size = ANS_LOG_TAB_SIZE - log_alpha_size;

        let mut seen: Vec<Vec<bool>> = counts.iter().map(|&c| vec![false; c as usize]).collect();
        for slot in 0..ANS_TAB_SIZE {
            let s = AliasTable::lookup(&table, slot, log_entry_size, (1 << log_entry_size) - 1);
            assert_eq!(s.freq, counts[s.value as usize]);
            assert!(!seen[s.value as usize][s.offset as usize], "offset {} of {} seen twice", s.offset, s.value);
            seen[s.value as usize][s.offset as usize] = true;
        }
        assert!(seen.iter().flatten().all(|&s| s));

        let slots = AliasTable::reverse_map(&table, &counts, log_alpha_size);
        for (value, offsets) in slots.iter().enumerate() {
            for (offset, &slot) in offsets.iter().enumerate() {
                let s = AliasTable::lookup(&table, slot, log_entry_size, (1 << log_entry_size) - 1);
                assert_eq!((s.value as usize, s.offset as usize), (value, offset));
            }
        }
    }
}

#[test]
fn test_alias_table_single_symbol() {
    let table = AliasTable::build(&[0, 0, 4096], ANS_TAB_SIZE, 8).unwrap();
    for slot in (0..ANS_TAB_SIZE).step_by(7) {
        let s = AliasTable::lookup(&table, slot, 4, 15);
        assert_eq!((s.value, s.offset, s.freq), (2, slot, 4096));
    }

    // An empty distribution means the first symbol takes the whole range.
    let table = AliasTable::build(&[], ANS_TAB_SIZE, 5).unwrap();
    assert_eq!(AliasTable::lookup(&table, 4095, 7, 127).value, 0);
}

#[test]
fn test_alias_table_errors() {
    assert!(matches!(AliasTable::build(&[100, 200], ANS_TAB_SIZE, 8), Err(Error::InvalidHistogramCount)));

    let mut counts = vec![1u32; 33];
    counts[0] = ANS_TAB_SIZE - 32;
    assert!(matches!(
        AliasTable::build(&counts, ANS_TAB_SIZE, 5),
        Err(Error::InvalidAlphabetSize { size: 33, max: 32 })
    ));
}

#[test]
fn test_hybrid_uint_examples() {
    let config = HybridUintConfig::default();
    for v in 0..16 {
        assert_eq!(config.encode(v), (v, 0, 0));
    }
    assert_eq!(config.encode(16), (16, 2, 0));
    assert_eq!(config.encode(20), (17, 2, 0));
    assert_eq!(config.encode(32), (20, 3, 0));
    assert_eq!(config.encode(65535).0, 63);
    assert_eq!(config.encode(65535).1, 13);
    assert_eq!(config.alphabet_size_for(65535), 64);

    let raw = HybridUintConfig::new(0, 0, 0);
    assert_eq!(raw.encode(0), (0, 0, 0));
    assert_eq!(raw.encode(1), (1, 0, 0));
    assert_eq!(raw.encode(5), (3, 2, 1));
}

#[test]
fn test_hybrid_uint_config_header() {
    let configs = [
        HybridUintConfig::new(4, 2, 0),
        HybridUintConfig::new(0, 0, 0),
        HybridUintConfig::new(8, 0, 0),
        HybridUintConfig::new(6, 3, 2),
    ];

    let mut writer = BinaryWriterBuilder::new();
    for c in configs.iter() {
        c.write(8, &mut writer);
    }
    let mut reader = to_reader(writer);
    for c in configs.iter() {
        assert_eq!(&HybridUintConfig::read(8, &mut reader).unwrap(), c);
    }
}

#[test]
fn test_hybrid_uint_config_invalid() {
    // split_exponent = 2, msb_in_token = 3.
    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(2, 4);
    writer.push_bits(3, 2);

    assert!(matches!(HybridUintConfig::read(8, &mut to_reader(writer)), Err(Error::InvalidUintConfig { .. })));
}

proptest! {
    #[test]
    fn test_hybrid_uint_bijection(value in any::<u32>(), split in 0u32..=8, msb in 0u32..=8, lsb in 0u32..=8) {
        prop_assume!(msb + lsb <= split);
        let config = HybridUintConfig::new(split, msb, lsb);

        let (token, nbits, bits) = config.encode(value);
        let mut writer = BinaryWriterBuilder::new();
        writer.push_bits(bits as u64, nbits as u64);
        let mut reader = to_reader(writer);

        prop_assert_eq!(config.decode(token, &mut reader), value);
        prop_assert_eq!(reader.total_bits_consumed(), nbits as usize);
    }
}

#[test]
fn test_lz77_params_header() {
    let params = Lz77Params::new(512, 20, HybridUintConfig::new(2, 1, 0));
    let mut writer = BinaryWriterBuilder::new();
    params.write(&mut writer).unwrap();
    Lz77Params::default().write(&mut writer).unwrap();

    let mut reader = to_reader(writer);
    let read = Lz77Params::read(&mut reader);
    assert!(read.enabled);
    assert_eq!((read.min_symbol, read.min_length), (512, 20));
    assert!(!Lz77Params::read(&mut reader).enabled);
}

#[test]
fn test_special_distances() {
    assert_eq!(special_distance(0, 7), 7);
    assert_eq!(special_distance(1, 7), 1);
    assert_eq!(special_distance(3, 7), 6);
    // dx + dy * multiplier below 1 is clamped.
    assert_eq!(special_distance(3, 1), 1);
    // And saturates above.
    assert_eq!(special_distance(0, u32::MAX), u32::MAX);
    assert_eq!(special_distance(4, u32::MAX), u32::MAX);
    assert_eq!(special_distance(3, u32::MAX), u32::MAX - 1);

    assert_eq!(distance_code(1, 0), 0);
    assert_eq!(distance_code(10, 0), 9);
    assert_eq!(distance_code(7, 7), 0);
    assert_eq!(distance_code(1, 1), 0);
    assert_eq!(distance_code(1000, 7), 999 + 120);
}

#[test]
fn test_context_map_mtf() {
    let map: Vec<u8> = vec![0, 0, 3, 3, 1, 2, 0, 3, 255, 255, 1];
    let mut transformed = map.clone();
    move_to_front(&mut transformed);
    assert_eq!(&transformed[..4], &[0, 0, 3, 0]);

    inverse_move_to_front(&mut transformed);
    assert_eq!(transformed, map);
}

#[test]
fn test_verify_context_map() {
    assert_eq!(verify_context_map(&[0, 1, 1, 2, 0]).unwrap(), 3);
    assert!(matches!(verify_context_map(&[0, 2, 2]), Err(Error::InvalidContextMap(_))));
}

#[test]
fn test_simple_context_map() {
    let map = vec![0, 1, 2, 1, 4, 3, 0];
    let mut writer = BinaryWriterBuilder::new();
    write_context_map_simple(&map, &mut writer).unwrap();
    write_context_map_simple(&[0, 0, 0], &mut writer).unwrap();

    let mut reader = to_reader(writer);
    assert_eq!(decode_context_map(&mut reader, map.len()).unwrap(), (map, 5));
    assert_eq!(decode_context_map(&mut reader, 3).unwrap(), (vec![0, 0, 0], 1));

    let mut writer = BinaryWriterBuilder::new();
    assert!(write_context_map_simple(&(0..9).collect::<Vec<u8>>(), &mut writer).is_err());
}

#[test]
fn test_coded_context_map_with_mtf() {
    let map: Vec<u8> = (0..40).map(|i| (i * 7 % 11) as u8).collect();
    let mut transformed = map.clone();
    move_to_front(&mut transformed);

    let mut writer = BinaryWriterBuilder::new();
    writer.push_bits(0, 1);
    writer.push_bits(1, 1);
    let tokens: Vec<Token> = transformed.iter().map(|&c| Token::new(0, c as u32)).collect();
    EntropyEncoder::builder(1).build(&tokens).unwrap().write(&mut writer).unwrap();

    assert_eq!(decode_context_map(&mut to_reader(writer), map.len()).unwrap(), (map, 11));
}

#[test]
fn test_ans_single_context() {
    let tokens: Vec<Token> = [100, 200, 3, 0, 10, 3, 2_500_000_000, 3, 3, 0, 1, 65535]
        .iter()
        .map(|&v| Token::new(0, v))
        .collect();
    assert_roundtrip(&tokens, 1, EncoderParams::default());
}

#[test]
fn test_ans_random_streams() {
    for (seed, num_contexts) in [(1, 1), (2, 3), (3, 7)] {
        let tokens = random_tokens(seed, 5000, num_contexts, u32::MAX);
        assert_roundtrip(&tokens, num_contexts as usize, EncoderParams::default());
    }
}

#[test]
fn test_ans_small_alphabets() {
    for log_alpha_size in 5..=8 {
        let tokens = random_tokens(log_alpha_size as u64, 2000, 3, 127);
        let params = EncoderParams { log_alpha_size, ..Default::default() };
        assert_roundtrip(&tokens, 3, params);
    }

    let tokens = vec![Token::new(0, 1 << 20)];
    let params = EncoderParams { log_alpha_size: 5, ..Default::default() };
    assert!(EntropyEncoder::builder(1).set_params(params).build(&tokens).is_err());
}

#[test]
fn test_ans_other_uint_configs() {
    let tokens = random_tokens(11, 3000, 2, 1 << 24);
    for uint_config in [HybridUintConfig::new(0, 0, 0), HybridUintConfig::new(6, 1, 1), HybridUintConfig::new(1, 1, 0)] {
        let params = EncoderParams { uint_config, ..Default::default() };
        assert_roundtrip(&tokens, 2, params);
    }
}

#[test]
fn test_ans_empty_and_unused_contexts() {
    assert_roundtrip(&[], 1, EncoderParams::default());
    assert_roundtrip(&[], 4, EncoderParams::default());

    let tokens: Vec<Token> = (0..50).map(|i| Token::new(if i % 2 == 0 { 0 } else { 3 }, i)).collect();
    assert_roundtrip(&tokens, 5, EncoderParams::default());
}

#[test]
fn test_ans_many_contexts_coded_context_map() {
    let tokens = random_tokens(5, 8000, 40, 1 << 16);
    assert_roundtrip(&tokens, 40, EncoderParams::default());
}

#[test]
fn test_prefix_code_streams() {
    let params = EncoderParams { use_prefix_code: true, ..Default::default() };

    // Few symbols per context: simple codes.
    let tokens: Vec<Token> = (0..200).map(|i| Token::new(i % 2, [1, 7, 7, 30][(i as usize / 2) % 4])).collect();
    assert_roundtrip(&tokens, 2, params);

    // Many symbols per context: complex codes, some longer than the root table.
    let tokens = random_tokens(7, 6000, 4, u32::MAX);
    assert_roundtrip(&tokens, 4, params);

    let tokens = random_tokens(8, 3000, 12, 1 << 12);
    assert_roundtrip(&tokens, 12, params);
}

#[test]
fn test_prefix_code_single_symbol() {
    let params = EncoderParams { use_prefix_code: true, ..Default::default() };
    let tokens = vec![Token::new(0, 0); 10];
    assert_roundtrip(&tokens, 1, params);

    let tokens = vec![Token::new(0, 9); 10];
    assert_roundtrip(&tokens, 1, params);
}

fn runs() -> Vec<Token> {
    let mut tokens = Vec::new();
    for (i, &(value, len)) in [(5, 1), (5, 40), (9, 2), (0, 300), (1, 3), (2, 1), (2, 4), (77_777, 1000)].iter().enumerate() {
        for _ in 0..len {
            tokens.push(Token::new(i as u32 % 2, value));
        }
    }
    tokens
}

#[test]
fn test_lz77_runs() {
    let tokens = runs();
    for use_prefix_code in [false, true] {
        let params = EncoderParams {
            use_prefix_code,
            lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
            ..Default::default()
        };
        let coded = assert_roundtrip(&tokens, 2, params);
        assert!(coded < tokens.len() / 10, "{coded} coded tokens for {}", tokens.len());
    }
}

#[test]
fn test_lz77_other_params() {
    let tokens = runs();
    let params = EncoderParams {
        lz77: Lz77Params::new(512, 9, HybridUintConfig::new(4, 2, 0)),
        use_prefix_code: true,
        ..Default::default()
    };
    assert_roundtrip(&tokens, 2, params);

    let params = EncoderParams {
        lz77: Lz77Params::new(224, 4, HybridUintConfig::new(0, 0, 0)),
        ..Default::default()
    };
    assert_roundtrip(&tokens, 2, params);
}

#[test]
fn test_lz77_special_distances() {
    let tokens = runs();
    for distance_multiplier in [1, 7, 1024] {
        let params = EncoderParams {
            lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
            distance_multiplier,
            ..Default::default()
        };
        assert_roundtrip(&tokens, 2, params);
    }
}

#[test]
fn test_lz77_value_collides_with_lengths() {
    let params = EncoderParams {
        lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
        uint_config: HybridUintConfig::new(8, 0, 0),
        ..Default::default()
    };
    let tokens = vec![Token::new(0, 230)];
    assert!(matches!(EntropyEncoder::builder(1).set_params(params).build(&tokens), Err(Error::InvalidEncoderInput(_))));
}

fn decode_parsed(tokens: &[Token], num_values: usize, params: EncoderParams) -> Vec<u32> {
    let encoder = EntropyEncoder::builder(1).set_params(params).build_parsed(tokens).unwrap();
    let mut writer = BinaryWriterBuilder::new();
    encoder.write(&mut writer).unwrap();

    let decoded = DecodedStream::decode_all(&mut to_reader(writer), 1, &vec![0; num_values], &options(&params)).unwrap();
    decoded.values
}

#[test]
fn test_lz77_overlapping_copy() {
    // Length 5 at distance 2 repeats the last two values.
    let tokens = [Token::new(0, 1), Token::new(0, 2), Token::lz77_length(0, 5 - 3), Token::new(1, distance_code(2, 0))];
    for use_prefix_code in [false, true] {
        let params = EncoderParams {
            use_prefix_code,
            lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
            ..Default::default()
        };
        assert_eq!(decode_parsed(&tokens, 7, params), vec![1, 2, 1, 2, 1, 2, 1]);
    }
}

#[test]
fn test_lz77_parsed_special_distances() {
    let params = EncoderParams {
        lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
        distance_multiplier: 3,
        ..Default::default()
    };
    assert_eq!(special_distance(0, 3), 3);
    assert_eq!(special_distance(2, 3), 4);

    let tokens = [
        Token::new(0, 1), Token::new(0, 2), Token::new(0, 3),
        // Code 0 is one row up: 3 back.
        Token::lz77_length(0, 4 - 3), Token::new(1, 0),
        // Code 2 is (1, 1): 4 back.
        Token::lz77_length(0, 3 - 3), Token::new(1, 2),
        // Past the special codes, code 121 is plain distance 2.
        Token::lz77_length(0, 5 - 3), Token::new(1, 121),
    ];
    assert_eq!(decode_parsed(&tokens, 15, params), vec![1, 2, 3, 1, 2, 3, 1, 1, 2, 3, 2, 3, 2, 3, 2]);
}

#[test]
fn test_lz77_parsed_needs_lz77() {
    let tokens = [Token::new(0, 1)];
    assert!(matches!(EntropyEncoder::builder(1).build_parsed(&tokens), Err(Error::InvalidEncoderInput(_))));
}

#[test]
fn test_state_stays_normalized() {
    let params = EncoderParams { uint_config: HybridUintConfig::new(8, 0, 0), ..Default::default() };
    let tokens = random_tokens(21, 3000, 1, 255);
    let (mut reader, _) = encode(&tokens, 1, params);

    let (code, context_map) = decode_histograms(&mut reader, 1, false).unwrap();
    let mut symbols = AnsSymbolReader::new(&code, &mut reader, 0);
    assert!(symbols.state() >= 1 << 16);

    for (i, t) in tokens.iter().enumerate() {
        assert_eq!(symbols.read_symbol(context_map[0] as usize, &mut reader), t.value);
        assert!(symbols.state() >= 1 << 16, "state {:#x} after symbol {i}", symbols.state());
    }
    assert!(symbols.check_final_state());
}

#[test]
fn test_lz77_disallowed() {
    let params = EncoderParams { lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)), ..Default::default() };
    let tokens = runs();
    let (mut reader, _) = encode(&tokens, 2, params);
    let contexts: Vec<usize> = tokens.iter().map(|t| t.context as usize).collect();

    let options = DecoderOptions { distance_multiplier: 0, disallow_lz77: true };
    assert!(matches!(DecodedStream::decode_all(&mut reader, 2, &contexts, &options), Err(Error::Lz77Disallowed)));
}

#[test]
fn test_final_state_mismatch() {
    let tokens = random_tokens(9, 500, 1, 1000);
    let (mut reader, _) = encode(&tokens, 1, EncoderParams::default());
    let contexts = vec![0; tokens.len() - 1];

    assert!(matches!(
        DecodedStream::decode_all(&mut reader, 1, &contexts, &DecoderOptions::default()),
        Err(Error::InvalidAnsFinalState(_))
    ));
}

#[test]
fn test_truncated_stream() {
    let tokens = random_tokens(10, 2000, 2, u32::MAX);
    let (reader, _) = encode(&tokens, 2, EncoderParams { use_prefix_code: true, ..Default::default() });
    let data = reader.data();
    let mut truncated = BinaryReader::new(data[..data.len() / 2].into());
    let contexts: Vec<usize> = tokens.iter().map(|t| t.context as usize).collect();

    assert!(DecodedStream::decode_all(&mut truncated, 2, &contexts, &DecoderOptions::default()).is_err());
}

#[test]
fn test_single_value_histogram() {
    let tokens = vec![Token::new(0, 3); 100];
    let (mut reader, _) = encode(&tokens, 1, EncoderParams::default());
    let (code, _) = decode_histograms(&mut reader, 1, false).unwrap();
    let mut symbols = AnsSymbolReader::new(&code, &mut reader, 0);

    assert_eq!(symbols.is_single_value(0, tokens.len()), Some(3));
    assert_eq!(symbols.num_decoded(), tokens.len());
    assert!(symbols.check_final_state());

    // Values above the split token carry raw bits.
    let tokens = vec![Token::new(0, 1000); 10];
    let (mut reader, _) = encode(&tokens, 1, EncoderParams::default());
    let (code, _) = decode_histograms(&mut reader, 1, false).unwrap();
    let mut symbols = AnsSymbolReader::new(&code, &mut reader, 0);
    assert_eq!(symbols.is_single_value(0, tokens.len()), None);

    let tokens = vec![Token::new(0, 1), Token::new(0, 2)];
    let (mut reader, _) = encode(&tokens, 1, EncoderParams::default());
    let (code, _) = decode_histograms(&mut reader, 1, false).unwrap();
    let mut symbols = AnsSymbolReader::new(&code, &mut reader, 0);
    assert_eq!(symbols.is_single_value(0, tokens.len()), None);
}

#[test]
fn test_signed_values() {
    let values = [0, -1, 1, -1000, 1000, i32::MIN, i32::MAX];
    let tokens: Vec<Token> = values.iter().map(|&v| Token::new(0, crate::utils::pack_signed(v))).collect();
    let (mut reader, _) = encode(&tokens, 1, EncoderParams::default());

    let (code, context_map) = decode_histograms(&mut reader, 1, false).unwrap();
    let mut symbols = AnsSymbolReader::new(&code, &mut reader, 0);
    for &v in values.iter() {
        assert_eq!(symbols.read_hybrid_uint_signed(0, &mut reader, &context_map), v);
    }
    assert!(symbols.check_final_state());
}

#[test]
fn test_token_file() {
    let tokens = random_tokens(12, 4000, 6, 1 << 10);
    let params = EncoderParams {
        lz77: Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)),
        distance_multiplier: 16,
        ..Default::default()
    };

    let encoded = EntropyEncoder::encode_token_file(&tokens, 6, params).unwrap();
    let mut reader = BinaryReader::new(encoded.os);
    let (contexts, stream) = DecodedStream::decode_tokens(&mut reader, 6, tokens.len(), &options(&params)).unwrap();

    let expected_contexts: Vec<usize> = tokens.iter().map(|t| t.context as usize).collect();
    let expected_values: Vec<u32> = tokens.iter().map(|t| t.value).collect();
    assert_eq!(contexts, expected_contexts);
    assert_eq!(stream.values, expected_values);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_random_streams_roundtrip(
        values in prop::collection::vec((0u32..4, any::<u32>()), 0..300),
        use_prefix_code in any::<bool>(),
        lz77 in any::<bool>(),
    ) {
        let tokens: Vec<Token> = values.iter().map(|&(c, v)| Token::new(c, v >> (v % 32))).collect();
        let mut params = EncoderParams { use_prefix_code, ..Default::default() };
        if lz77 {
            params.lz77 = Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0));
        }

        let (mut reader, _) = encode(&tokens, 4, params);
        let contexts: Vec<usize> = tokens.iter().map(|t| t.context as usize).collect();
        let decoded = DecodedStream::decode_all(&mut reader, 4, &contexts, &options(&params)).unwrap();
        let expected: Vec<u32> = tokens.iter().map(|t| t.value).collect();
        prop_assert_eq!(decoded.values, expected);
    }
}
