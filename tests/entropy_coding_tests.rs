use ccsds_entropy::{
    AnyCoder, BinaryCoder, BitplaneCoder, ByteStream, CoderKind, DualWordConfig, FrequencyTable,
    ModelConfig, ProbabilityStrategy, SampleGrid, SymbolBitDecomposer, VARIANT_COUNT,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom};

fn coder(kind: CoderKind, contexts: usize) -> AnyCoder {
    AnyCoder::new(
        kind,
        contexts,
        ModelConfig::default(),
        DualWordConfig::default(),
    )
    .expect("Failed to create coder")
}

/// A source whose context is the previous bit and whose bits are skewed per
/// context.
fn markov_bits(seed: u64, len: usize) -> Vec<(bool, usize)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut prev = 0usize;
    (0..len)
        .map(|_| {
            let p = if prev == 0 { 0.1 } else { 0.7 };
            let bit = rng.random_bool(p);
            let item = (bit, prev);
            prev = bit as usize;
            item
        })
        .collect()
}

fn encode_bits(kind: CoderKind, bits: &[(bool, usize)]) -> ByteStream {
    let mut enc = coder(kind, 2);
    enc.restart_encoding();
    for &(bit, ctx) in bits {
        enc.encode_bit_with_context(bit, ctx);
    }
    enc.terminate();
    enc.change_stream(ByteStream::new())
}

fn decode_bits(kind: CoderKind, stream: ByteStream, contexts: &[usize]) -> Vec<bool> {
    let mut dec = coder(kind, 2);
    dec.change_stream(stream);
    dec.restart_decoding().expect("Failed to start decoding");
    contexts
        .iter()
        .map(|&ctx| dec.decode_bit_with_context(ctx).expect("Decode failed"))
        .collect()
}

#[test]
fn test_context_round_trip_every_coder() {
    let bits = markov_bits(2024, 20_000);
    let contexts: Vec<usize> = bits.iter().map(|&(_, c)| c).collect();
    let expected: Vec<bool> = bits.iter().map(|&(b, _)| b).collect();

    for kind in CoderKind::ALL {
        let stream = encode_bits(kind, &bits);
        // The source carries under 0.6 bits of entropy per symbol.
        assert!(
            stream.len() < bits.len() / 8,
            "{:?} produced {} bytes",
            kind,
            stream.len()
        );
        assert_eq!(decode_bits(kind, stream, &contexts), expected, "{:?}", kind);
    }
}

#[test]
fn test_encoding_is_deterministic() {
    let bits = markov_bits(99, 5_000);
    for kind in CoderKind::ALL {
        let first = encode_bits(kind, &bits);
        let second = encode_bits(kind, &bits);
        assert_eq!(first, second, "{:?}", kind);
    }
}

#[test]
fn test_streams_end_without_fill_bytes() {
    for seed in 0..20 {
        let bits = markov_bits(seed, 1 + seed as usize * 37);
        let range = encode_bits(CoderKind::Range, &bits);
        assert_ne!(range.as_slice().last(), Some(&0xFF), "seed {}", seed);
        for kind in [CoderKind::State, CoderKind::DualWord] {
            let stream = encode_bits(kind, &bits);
            assert_ne!(stream.as_slice().last(), Some(&0x00), "{:?} seed {}", kind, seed);
        }
    }
}

#[test]
fn test_symbol_sequence_through_range_coder() {
    let symbols = [0u32, 1, 0, 0, 1, 1, 0, 1];
    let table = FrequencyTable::from_cumulative(vec![0, 1, 2]).unwrap();

    let mut enc = coder(CoderKind::Range, 1);
    enc.restart_encoding();
    let mut decomposer = SymbolBitDecomposer::new(table.clone());
    for &s in &symbols {
        decomposer.encode_symbol(&mut enc, s).unwrap();
    }
    enc.terminate();
    let stream = enc.change_stream(ByteStream::new());
    assert!(stream.len() <= 4, "{} bytes", stream.len());

    let mut dec = coder(CoderKind::Range, 1);
    dec.change_stream(stream);
    dec.restart_decoding().unwrap();
    let mut decomposer = SymbolBitDecomposer::new(table);
    let decoded: Vec<u32> = (0..symbols.len())
        .map(|_| decomposer.decode_symbol(&mut dec).unwrap())
        .collect();
    assert_eq!(decoded, symbols);
}

#[test]
fn test_stream_survives_a_file() {
    let bits = markov_bits(7, 3_000);
    let contexts: Vec<usize> = bits.iter().map(|&(_, c)| c).collect();
    let expected: Vec<bool> = bits.iter().map(|&(b, _)| b).collect();

    let mut file: File = tempfile::tempfile().expect("Failed to create temp file");
    let streams: Vec<ByteStream> = CoderKind::ALL
        .iter()
        .map(|&kind| encode_bits(kind, &bits))
        .collect();
    {
        let mut writer = BufWriter::new(&mut file);
        for stream in &streams {
            stream.write_to(&mut writer).unwrap();
        }
    }
    file.seek(SeekFrom::Start(0)).unwrap();

    let mut reader = BufReader::new(&mut file);
    for (kind, original) in CoderKind::ALL.iter().zip(&streams) {
        let stream = ByteStream::read_from(&mut reader).unwrap();
        assert_eq!(&stream, original);
        assert_eq!(decode_bits(*kind, stream, &contexts), expected, "{:?}", kind);
    }
}

fn textured_grid(seed: u64, bands: usize, rows: usize, columns: usize) -> SampleGrid {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut samples = Vec::with_capacity(bands * rows * columns);
    for b in 0..bands {
        for r in 0..rows {
            for c in 0..columns {
                let smooth = (r * 13 + c * 7 + b * 3) as u16 % 512;
                samples.push(smooth + rng.random_range(0..8));
            }
        }
    }
    SampleGrid::from_samples(bands, rows, columns, samples).unwrap()
}

#[test]
fn test_image_round_trip() {
    let grid = textured_grid(1, 4, 12, 10);
    for variant in [0, 4, 9, 12, VARIANT_COUNT - 1] {
        let pass = BitplaneCoder::new(variant).unwrap();
        for kind in CoderKind::ALL {
            let streams = pass
                .encode_image(&grid, kind, ModelConfig::default())
                .expect("Failed to encode image");
            let decoded = pass
                .decode_image(streams, 12, 10, kind, ModelConfig::default())
                .expect("Failed to decode image");
            assert_eq!(decoded, grid, "variant {} {:?}", variant, kind);
        }
    }
}

#[test]
fn test_image_round_trip_other_strategies() {
    let grid = textured_grid(5, 2, 9, 9);
    let pass = BitplaneCoder::new(8).unwrap();
    for strategy in [ProbabilityStrategy::Lookup, ProbabilityStrategy::Averaging] {
        let model = ModelConfig {
            strategy,
            window_size: if strategy == ProbabilityStrategy::Averaging { 1024 } else { 1023 },
            ..ModelConfig::default()
        };
        for kind in [CoderKind::Range, CoderKind::DualWord] {
            let streams = pass.encode_image(&grid, kind, model).unwrap();
            let decoded = pass.decode_image(streams, 9, 9, kind, model).unwrap();
            assert_eq!(decoded, grid, "{:?} {:?}", strategy, kind);
        }
    }
}

#[test]
fn test_context_modeling_pays_off() {
    // Left half dark, right half saturated: a sample is significant exactly
    // when its west neighbor is, except on the edge.
    let samples = (0..24 * 24)
        .map(|i| if i % 24 >= 12 { 0xFF } else { 0 })
        .collect();
    let grid = SampleGrid::from_samples(1, 24, 24, samples).unwrap();

    let size = |variant: usize| -> usize {
        BitplaneCoder::new(variant)
            .unwrap()
            .encode_image(&grid, CoderKind::Range, ModelConfig::default())
            .unwrap()
            .iter()
            .map(ByteStream::len)
            .sum()
    };
    assert!(size(3) * 2 < size(0));
}
