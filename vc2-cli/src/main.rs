//! Command-line VC-2 encoder/decoder for PPM images.

mod color;
mod ppm;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use vc2_codec::dataunit::{read_sequence_header, DataUnitType, SequenceHeader, StreamReader};
use vc2_codec::{DecoderConfig, EncoderConfig, Profile, Vc2Decoder, Vc2Encoder, WaveletKernel};
use vc2_core::{ChromaFormat, Error, Picture, Result};

#[derive(Parser)]
#[command(name = "vc2", version, about = "SMPTE VC-2 encoder/decoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose progress reporting.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a PPM image into a VC-2 stream.
    Encode(EncodeArgs),
    /// Decompress a VC-2 stream back to a PPM image.
    Decode(DecodeArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChromaArg {
    Rgb,
    #[value(name = "444")]
    C444,
    #[value(name = "422")]
    C422,
    #[value(name = "420")]
    C420,
}

impl From<ChromaArg> for ChromaFormat {
    fn from(arg: ChromaArg) -> Self {
        match arg {
            ChromaArg::Rgb => ChromaFormat::Rgb,
            ChromaArg::C444 => ChromaFormat::C444,
            ChromaArg::C422 => ChromaFormat::C422,
            ChromaArg::C420 => ChromaFormat::C420,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum KernelArg {
    Dd97,
    Legall,
    Dd137,
    Haar0,
    Haar1,
    Fidelity,
    Daub97,
}

impl From<KernelArg> for WaveletKernel {
    fn from(arg: KernelArg) -> Self {
        match arg {
            KernelArg::Dd97 => WaveletKernel::Dd97,
            KernelArg::Legall => WaveletKernel::LeGall,
            KernelArg::Dd137 => WaveletKernel::Dd137,
            KernelArg::Haar0 => WaveletKernel::Haar0,
            KernelArg::Haar1 => WaveletKernel::Haar1,
            KernelArg::Fidelity => WaveletKernel::Fidelity,
            KernelArg::Daub97 => WaveletKernel::Daub97,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    Hq,
    Ld,
}

#[derive(Args)]
struct EncodeArgs {
    /// Input PPM (P6) file.
    input: PathBuf,
    /// Output VC-2 stream file.
    output: PathBuf,

    /// Chroma format to code with.
    #[arg(short = 'f', long, value_enum, default_value_t = ChromaArg::C422)]
    chroma_format: ChromaArg,

    /// Wavelet kernel.
    #[arg(short, long, value_enum, default_value_t = KernelArg::Legall)]
    kernel: KernelArg,

    /// Wavelet decomposition depth.
    #[arg(short, long, default_value_t = 3)]
    depth: u32,

    /// Compression ratio (raw bytes per compressed byte).
    #[arg(short, long, default_value_t = 2.0)]
    ratio: f64,

    /// Profile to code with.
    #[arg(short, long, value_enum, default_value_t = ProfileArg::Hq)]
    profile: ProfileArg,

    /// Code the source as two fields per frame.
    #[arg(short, long)]
    interlaced: bool,

    /// Signal top-field-first for interlaced sources.
    #[arg(long)]
    top_field_first: bool,

    /// HQ slice size scalar.
    #[arg(long, default_value_t = 1)]
    slice_size_scalar: usize,
}

#[derive(Args)]
struct DecodeArgs {
    /// Input VC-2 stream file.
    input: PathBuf,
    /// Output PPM (P6) file.
    output: PathBuf,

    /// Chroma format the stream was coded with.
    #[arg(short = 'f', long, value_enum, default_value_t = ChromaArg::C422)]
    chroma_format: ChromaArg,

    /// Compression ratio the stream was coded at (constant-rate HQ).
    #[arg(short, long, default_value_t = 2.0)]
    ratio: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Encode(args) => encode(args),
        Commands::Decode(args) => decode(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn bit_depth_for_max_value(max_value: u32) -> Result<u32> {
    match max_value {
        255 => Ok(8),
        1023 => Ok(10),
        4095 => Ok(12),
        other => Err(Error::config(format!(
            "PPM max value {other} does not map to a supported bit depth (8, 10 or 12)"
        ))),
    }
}

fn encode(args: EncodeArgs) -> Result<()> {
    let image = ppm::read_ppm(&args.input)?;
    let bit_depth = bit_depth_for_max_value(image.max_value)?;
    let chroma = ChromaFormat::from(args.chroma_format);
    info!(
        input = %args.input.display(),
        width = image.width,
        height = image.height,
        %chroma,
        bit_depth,
        "read source image"
    );

    let mut config = EncoderConfig::new(image.height, image.width, chroma);
    config.bit_depth = bit_depth;
    config.kernel = args.kernel.into();
    config.depth = args.depth;
    config.interlaced = args.interlaced;
    config.top_field_first = args.top_field_first;
    config.profile = match args.profile {
        ProfileArg::Hq => Profile::HighQuality,
        ProfileArg::Ld => Profile::LowDelay,
    };
    config.slice_size_scalar = args.slice_size_scalar;
    config.picture_bytes = config.bytes_for_ratio(args.ratio);

    let (y_slices, x_slices) = config.slice_grid()?;
    info!(
        kernel = %config.kernel,
        depth = config.depth,
        picture_bytes = config.picture_bytes,
        y_slices,
        x_slices,
        "encoding"
    );

    let picture = color::picture_from_rgb(&image, chroma)?;
    let mut encoder = Vc2Encoder::new(config)?;
    let stream = encoder.encode_sequence(&[picture])?;
    let bytes = stream.len();
    std::fs::write(&args.output, stream)?;
    info!(bytes, output = %args.output.display(), "stream written");
    Ok(())
}

/// Scan the stream for its sequence header without decoding pictures.
fn probe_header(data: &[u8]) -> Result<SequenceHeader> {
    let mut reader = StreamReader::new(data);
    loop {
        reader.synchronise()?;
        let unit = reader.read_unit()?;
        if unit.unit_type == DataUnitType::SequenceHeader {
            return read_sequence_header(unit.payload);
        }
    }
}

fn decode(args: DecodeArgs) -> Result<()> {
    let data = std::fs::read(&args.input)?;
    let chroma = ChromaFormat::from(args.chroma_format);

    let header = probe_header(&data)?;
    debug!(
        width = header.width,
        height = header.height,
        interlace = header.interlace,
        "probed sequence header"
    );

    let mut rate_config = EncoderConfig::new(header.height, header.width, chroma);
    rate_config.bit_depth = header.bit_depth;
    let picture_bytes = rate_config.bytes_for_ratio(args.ratio);

    let decoder = Vc2Decoder::new(DecoderConfig {
        picture_bytes: Some(picture_bytes),
        chroma_format: Some(chroma),
    });
    let output = decoder.decode_sequence(&data)?;
    info!(pictures = output.pictures.len(), "decoded sequence");

    let frame = if output.header.interlace {
        let [top, bottom] = &output.pictures[..] else {
            return Err(Error::config(
                "expected exactly two fields in the interlaced stream".to_string(),
            ));
        };
        Picture::weave_fields(top, bottom)?
    } else {
        output
            .pictures
            .into_iter()
            .next()
            .ok_or_else(|| Error::config("stream contains no pictures".to_string()))?
    };

    let max_value = (1u32 << output.header.bit_depth) - 1;
    let image = color::rgb_from_picture(&frame, max_value)?;
    ppm::write_ppm(&args.output, &image)?;
    info!(output = %args.output.display(), "image written");
    Ok(())
}
