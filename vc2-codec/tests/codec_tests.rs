//! End-to-end tests for the VC-2 encoder and decoder.

use vc2_codec::dataunit::{DataUnitType, StreamReader};
use vc2_codec::{DecoderConfig, EncoderConfig, Profile, Vc2Decoder, Vc2Encoder, WaveletKernel};
use vc2_core::{ChromaFormat, Picture, PictureFormat};

fn gradient_picture(height: usize, width: usize, chroma: ChromaFormat) -> Picture {
    let format = PictureFormat::new(height, width, chroma);
    let mut picture = Picture::new(format);
    for y in 0..height {
        for x in 0..width {
            picture.y_mut()[(y, x)] = (16 + (x * 11 + y * 3) % 220) as i32;
        }
    }
    for y in 0..format.chroma_height() {
        for x in 0..format.chroma_width() {
            picture.c1_mut()[(y, x)] = (128 + ((x * 5 + y) % 41) as i32) - 20;
            picture.c2_mut()[(y, x)] = (128 - ((x + y * 7) % 37) as i32) + 18;
        }
    }
    picture
}

fn lossless_config(
    height: usize,
    width: usize,
    chroma: ChromaFormat,
    kernel: WaveletKernel,
    depth: u32,
) -> EncoderConfig {
    let mut config = EncoderConfig::new(height, width, chroma);
    config.kernel = kernel;
    config.depth = depth;
    // A budget generous enough that the quantiser search lands on q = 0
    // for every slice.
    let (y_slices, x_slices) = config.slice_grid().unwrap();
    config.picture_bytes = y_slices * x_slices * 200;
    config
}

fn decoder_for(config: &EncoderConfig) -> Vc2Decoder {
    Vc2Decoder::new(DecoderConfig {
        picture_bytes: Some(config.picture_bytes),
        chroma_format: Some(config.chroma_format),
    })
}

#[test]
fn lossless_round_trip_for_integer_kernels() {
    let kernels = [
        WaveletKernel::LeGall,
        WaveletKernel::Haar0,
        WaveletKernel::Haar1,
        WaveletKernel::Dd97,
        WaveletKernel::Dd137,
    ];
    for kernel in kernels {
        for depth in 1..=2 {
            let picture = gradient_picture(32, 32, ChromaFormat::C444);
            let config = lossless_config(32, 32, ChromaFormat::C444, kernel, depth);
            let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
            let stream = encoder.encode_sequence(&[picture.clone()]).unwrap();

            let output = decoder_for(&config).decode_sequence(&stream).unwrap();
            assert_eq!(output.pictures.len(), 1, "{kernel} depth {depth}");
            assert_eq!(output.pictures[0], picture, "{kernel} depth {depth}");
        }
    }
}

#[test]
fn constant_grey_haar_round_trip() {
    let format = PictureFormat::new(16, 16, ChromaFormat::C444);
    let mut picture = Picture::new(format);
    for y in 0..16 {
        for x in 0..16 {
            picture.y_mut()[(y, x)] = 128;
            picture.c1_mut()[(y, x)] = 128;
            picture.c2_mut()[(y, x)] = 128;
        }
    }
    let config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::Haar0, 1);
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let stream = encoder.encode_sequence(&[picture.clone()]).unwrap();

    let output = decoder_for(&config).decode_sequence(&stream).unwrap();
    assert_eq!(output.pictures[0].y(), picture.y());
}

#[test]
fn cbr_picture_payload_is_exact() {
    let mut config = EncoderConfig::new(64, 64, ChromaFormat::C422);
    config.depth = 2;
    config.picture_bytes = 8192;
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(64, 64, ChromaFormat::C422);
    let stream = encoder.encode_sequence(&[picture]).unwrap();

    let mut reader = StreamReader::new(&stream);
    let mut saw_picture = false;
    loop {
        reader.synchronise().unwrap();
        let unit = reader.read_unit().unwrap();
        match unit.unit_type {
            DataUnitType::HqPicture => {
                saw_picture = true;
                // Preamble plus exactly the frame byte budget of slices.
                assert!(unit.payload.len() >= config.picture_bytes);
                assert!(unit.payload.len() <= config.picture_bytes + 32);
            }
            DataUnitType::EndOfSequence => break,
            _ => {}
        }
    }
    assert!(saw_picture);
}

#[test]
fn parse_info_chain_is_consistent() {
    let config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::LeGall, 1);
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let frames = vec![gradient_picture(16, 16, ChromaFormat::C444); 3];
    let stream = encoder.encode_sequence(&frames).unwrap();

    let mut reader = StreamReader::new(&stream);
    let mut previous_next = 0u32;
    let mut first = true;
    loop {
        reader.synchronise().unwrap();
        let unit = reader.read_unit().unwrap();
        if first {
            assert_eq!(unit.prev_parse_offset, 0);
            first = false;
        } else {
            assert_eq!(unit.prev_parse_offset, previous_next);
        }
        previous_next = unit.next_parse_offset;
        if unit.unit_type == DataUnitType::EndOfSequence {
            assert_eq!(unit.next_parse_offset, 0);
            break;
        }
    }
}

#[test]
fn decoder_resynchronises_after_injected_junk() {
    let config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::LeGall, 1);
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(16, 16, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[picture.clone(), picture.clone()]).unwrap();

    // Find the unit boundaries, then splice junk in front of the
    // second picture's parse info.
    let mut boundary_reader = StreamReader::new(&stream);
    let mut boundaries = Vec::new();
    loop {
        boundaries.push(boundary_reader.position());
        boundary_reader.synchronise().unwrap();
        if boundary_reader.read_unit().unwrap().unit_type == DataUnitType::EndOfSequence {
            break;
        }
    }
    // Sequence header, first picture, second picture.
    let third_unit = boundaries[2];

    let mut spliced = Vec::new();
    spliced.extend_from_slice(&stream[..third_unit]);
    spliced.extend_from_slice(&[0x00, 0x11, 0x22, 0x42, 0x00]);
    spliced.extend_from_slice(&stream[third_unit..]);

    let output = decoder_for(&config).decode_sequence(&spliced).unwrap();
    assert_eq!(output.pictures.len(), 2);
    assert_eq!(output.pictures[1], picture);
}

#[test]
fn missing_end_of_sequence_is_clean_after_first_picture() {
    let config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::Haar0, 1);
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(16, 16, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[picture.clone()]).unwrap();

    let truncated = &stream[..stream.len() - 13];
    let output = decoder_for(&config).decode_sequence(truncated).unwrap();
    assert_eq!(output.pictures.len(), 1);
    assert_eq!(output.pictures[0], picture);
}

#[test]
fn interlaced_frames_code_as_two_fields() {
    let mut config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::Haar1, 1);
    config.interlaced = true;
    config.top_field_first = true;
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let frame = gradient_picture(16, 16, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[frame.clone()]).unwrap();

    let output = decoder_for(&config).decode_sequence(&stream).unwrap();
    assert!(output.header.interlace);
    assert_eq!(output.pictures.len(), 2);

    let rewoven = Picture::weave_fields(&output.pictures[0], &output.pictures[1]).unwrap();
    assert_eq!(rewoven, frame);
}

#[test]
fn low_delay_round_trip() {
    let mut config = lossless_config(32, 32, ChromaFormat::C444, WaveletKernel::LeGall, 2);
    config.profile = Profile::LowDelay;
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(32, 32, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[picture.clone()]).unwrap();

    let output = decoder_for(&config).decode_sequence(&stream).unwrap();
    assert_eq!(output.header.profile, Profile::LowDelay);
    assert_eq!(output.pictures.len(), 1);
    assert_eq!(output.pictures[0], picture);
}

#[test]
fn tight_budget_still_produces_a_decodable_stream() {
    let mut config = EncoderConfig::new(32, 32, ChromaFormat::C444);
    config.depth = 2;
    let (y_slices, x_slices) = config.slice_grid().unwrap();
    // Just above the all-zero floor: heavy quantisation, valid stream.
    config.picture_bytes = y_slices * x_slices * 16;
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(32, 32, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[picture]).unwrap();

    let output = decoder_for(&config).decode_sequence(&stream).unwrap();
    assert_eq!(output.pictures.len(), 1);
    assert_eq!(output.pictures[0].format().luma_width(), 32);
}

#[test]
fn sequence_header_survives_the_wire() {
    let mut config = lossless_config(16, 16, ChromaFormat::C444, WaveletKernel::LeGall, 1);
    config.bit_depth = 8;
    let mut encoder = Vc2Encoder::new(config.clone()).unwrap();
    let picture = gradient_picture(16, 16, ChromaFormat::C444);
    let stream = encoder.encode_sequence(&[picture]).unwrap();

    let output = decoder_for(&config).decode_sequence(&stream).unwrap();
    assert_eq!(output.header.width, 16);
    assert_eq!(output.header.height, 16);
    assert_eq!(output.header.bit_depth, 8);
    assert_eq!(output.header.profile, Profile::HighQuality);
}
