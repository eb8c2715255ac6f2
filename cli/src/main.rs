mod overlay;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hound::{SampleFormat, WavSpec};
use log::{debug, info};
use overlay::ConfigOverlay;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tonelink_core::codec::bits_to_string;
use tonelink_core::modulator::total_duration;
use tonelink_core::{
    BitCodec, Decoded, Decoder, FlipPlan, MessageFormat, Modulation, ProtocolConfig, Receiver,
    Sender, StopSignal, Synthesizer,
};

#[derive(Parser)]
#[command(name = "tonelink")]
#[command(about = "Acoustic FSK link with two-bit CRC error correction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tone plan for a message as JSON
    Plan {
        /// Message to send
        #[arg(value_name = "MESSAGE")]
        message: String,

        #[command(flatten)]
        flips: FlipArgs,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },

    /// Encode a message to a WAV audio file
    Encode {
        /// Message to send
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Silence before and after the frame, in seconds
        #[arg(long, default_value = "0.5")]
        padding_secs: f32,

        #[command(flatten)]
        flips: FlipArgs,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },

    /// Decode a message from a WAV audio file
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Give up after this many seconds of wall-clock time
        #[arg(long)]
        timeout_secs: Option<u64>,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },

    /// Check and correct a received data block (payload followed by check bits)
    Check {
        /// Data block as a string of 0 and 1
        #[arg(value_name = "BITS")]
        bits: String,

        #[command(flatten)]
        protocol: ProtocolArgs,
    },
}

#[derive(Args)]
struct ProtocolArgs {
    /// Send 4 bits per tone over 16 carriers
    #[arg(long)]
    grouped: bool,

    /// How message text maps to bits
    #[arg(long, value_enum, default_value = "binary")]
    format: FormatArg,

    /// JSON file overriding protocol parameters
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct FlipArgs {
    /// Flip the data-block bit at this fraction of its length (up to two)
    #[arg(long = "flip", value_name = "FRACTION")]
    flips: Vec<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Binary,
    Ascii,
}

impl From<FormatArg> for MessageFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Binary => MessageFormat::Binary,
            FormatArg::Ascii => MessageFormat::Ascii,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error("at most two flip fractions are supported, got {0}")]
    TooManyFlips(usize),

    #[error("unsupported WAV format: {0:?} with {1} bits per sample")]
    UnsupportedWav(SampleFormat, u16),
}

#[derive(Serialize)]
struct PlannedTone {
    frequency_hz: f32,
    duration_s: f32,
}

#[derive(Serialize)]
struct TonePlan<'a> {
    message: &'a str,
    modulation: &'static str,
    data_bits: String,
    on_air_bits: String,
    flipped: Vec<usize>,
    duration_s: f32,
    tones: Vec<PlannedTone>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan {
            message,
            flips,
            protocol,
        } => plan_command(&message, &flips, &protocol)?,
        Commands::Encode {
            message,
            output,
            padding_secs,
            flips,
            protocol,
        } => encode_command(&message, &output, padding_secs, &flips, &protocol)?,
        Commands::Decode {
            input,
            timeout_secs,
            protocol,
        } => decode_command(&input, timeout_secs, &protocol)?,
        Commands::Check { bits, protocol } => check_command(&bits, &protocol)?,
    }

    Ok(())
}

/// Defaults, then the JSON overlay, then command-line flags
fn load_config(args: &ProtocolArgs) -> Result<ProtocolConfig, Box<dyn std::error::Error>> {
    let mut config = ProtocolConfig::default();
    if let Some(path) = &args.config {
        ConfigOverlay::load(path)?.apply(&mut config);
        debug!("Loaded protocol overrides from {}", path.display());
    }
    if args.grouped {
        config.modulation = Modulation::Grouped;
    }
    config.validate()?;
    Ok(config)
}

fn flip_plan(args: &FlipArgs) -> Result<FlipPlan, CliError> {
    match args.flips.as_slice() {
        [] => Ok(FlipPlan::none()),
        [first] => Ok(FlipPlan::from_fractions(*first, 0.0)),
        [first, second] => Ok(FlipPlan::from_fractions(*first, *second)),
        more => Err(CliError::TooManyFlips(more.len())),
    }
}

fn modulation_name(modulation: Modulation) -> &'static str {
    match modulation {
        Modulation::Binary => "binary",
        Modulation::Grouped => "grouped",
    }
}

fn plan_command(
    message: &str,
    flips: &FlipArgs,
    protocol: &ProtocolArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(protocol)?;
    let sender = Sender::new(&config, protocol.format.into())?;
    let tx = sender.transmit(message, &flip_plan(flips)?)?;

    let plan = TonePlan {
        message,
        modulation: modulation_name(config.modulation),
        data_bits: bits_to_string(&tx.data_bits),
        on_air_bits: bits_to_string(&tx.on_air_bits),
        flipped: tx.flipped.clone(),
        duration_s: total_duration(&tx.tones),
        tones: tx
            .tones
            .iter()
            .map(|tone| PlannedTone {
                frequency_hz: tone.frequency_hz,
                duration_s: tone.duration_s,
            })
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

fn encode_command(
    message: &str,
    output_path: &Path,
    padding_secs: f32,
    flips: &FlipArgs,
    protocol: &ProtocolArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(protocol)?;
    let sender = Sender::new(&config, protocol.format.into())?;
    let tx = sender.transmit(message, &flip_plan(flips)?)?;
    println!(
        "Framed {} data bits into {} tones ({:.2}s)",
        tx.data_bits.len(),
        tx.tones.len(),
        total_duration(&tx.tones)
    );
    if !tx.flipped.is_empty() {
        println!("Injected bit flips at positions {}", one_indexed(&tx.flipped));
    }

    let synth = Synthesizer::new(&config);
    let padding = synth.silence(padding_secs.max(0.0));
    let mut samples = padding.clone();
    samples.extend(synth.render(&tx.tones));
    samples.extend(padding);

    write_wav(output_path, &samples, config.sample_rate)?;
    println!("Wrote {} samples to {}", samples.len(), output_path.display());
    Ok(())
}

fn decode_command(
    input_path: &Path,
    timeout_secs: Option<u64>,
    protocol: &ProtocolArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(protocol)?;
    let (samples, sample_rate) = read_wav(input_path)?;
    config.sample_rate = sample_rate;
    println!("Extracted {} samples", samples.len());

    let stop = match timeout_secs {
        Some(secs) => StopSignal::with_timeout(Duration::from_secs(secs)),
        None => StopSignal::new(),
    };

    let receiver = Receiver::new(&config, protocol.format.into())?;
    let decoded = receiver.receive_samples(&samples, &stop)?;
    report(&decoded);
    Ok(())
}

fn check_command(bits: &str, protocol: &ProtocolArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(protocol)?;
    let block = BitCodec::new(MessageFormat::Binary).message_to_bits(bits)?;

    let decoded = Decoder::new(&config, protocol.format.into()).decode(&block)?;
    report(&decoded);
    Ok(())
}

fn report(decoded: &Decoded) {
    println!("Message: {}", decoded.message);
    if decoded.flipped.is_empty() {
        println!("No bit errors detected");
    } else {
        println!("Corrected bits at positions {}", one_indexed(&decoded.flipped));
    }
    if !decoded.padding_flips.is_empty() {
        println!(
            "Non-zero padding bits at positions {}",
            one_indexed(&decoded.padding_flips)
        );
    }
}

fn one_indexed(positions: &[usize]) -> String {
    positions
        .iter()
        .map(|p| (p + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_wav(
    output_path: &Path,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = File::create(output_path)?;
    let mut writer = hound::WavWriter::new(file, spec)?;

    // Convert f32 samples to i16 range [-32768, 32767]
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer.write_sample((clamped * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// First channel of a 16-bit PCM or 32-bit float WAV file, with its sample rate
fn read_wav(input_path: &Path) -> Result<(Vec<f32>, u32), Box<dyn std::error::Error>> {
    let file = File::open(input_path)?;
    let mut reader = hound::WavReader::new(file)?;

    let spec = reader.spec();
    info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        (format, bits) => return Err(CliError::UnsupportedWav(format, bits).into()),
    };

    let channels = spec.channels.max(1) as usize;
    let samples = interleaved.into_iter().step_by(channels).collect();
    Ok((samples, spec.sample_rate))
}
