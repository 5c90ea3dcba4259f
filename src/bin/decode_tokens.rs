use std::{fs::{self, File}, hint::black_box, io::{self, BufReader}, time::Instant};

use clap::Parser;
use rand::Rng;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ans_rust::{
    ans::{EncoderParams, EntropyEncoder, Token},
    bitstreams::BinaryReader,
    utils::unpack_signed,
    DecodedStream, DecoderOptions, Error, Result, StreamProperties,
};

#[derive(Parser, Debug)]
#[command(about = "Decode a token file written by encode_tokens, printing the tokens as JSON")]
struct Args {
    /// The basename of the .ans and .properties files
    #[arg(required_unless_present = "perf")]
    source_name: Option<String>,
    /// Time the decoding of random-access queries over synthetic streams instead
    #[arg(long)]
    perf: bool,
    /// Tokens per synthetic stream
    #[arg(long, default_value_t = 100_000)]
    perf_tokens: usize,
    /// Contexts per synthetic stream
    #[arg(long, default_value_t = 8)]
    perf_contexts: u32,
    /// Code the synthetic streams with prefix codes
    #[arg(long)]
    prefix: bool,
}

#[derive(Serialize, Debug)]
struct OutputToken {
    context: usize,
    value: i64,
}

const N_STREAMS: usize = 16;
const N_QUERIES: usize = 64;
const N_RUNS: usize = 3;

fn read_properties(basename: &str) -> Result<StreamProperties> {
    let properties_file = File::open(format!("{basename}.properties"))?;
    let p = java_properties::read(BufReader::new(properties_file))
        .map_err(|e| Error::Properties(format!("Failed parsing the properties file: {e}")))?;
    StreamProperties::try_from(p)
}

fn decode(basename: &str) -> Result<()> {
    let props = read_properties(basename)?;
    let data = fs::read(format!("{basename}.ans"))?;
    info!(?props, bytes = data.len(), "decoding");

    let mut reader = BinaryReader::new(data.into_boxed_slice());
    let (contexts, stream) = DecodedStream::decode_tokens(&mut reader, props.num_contexts, props.num_tokens, &DecoderOptions::from(&props))?;

    let tokens: Vec<OutputToken> = contexts.into_iter()
        .zip(stream.values)
        .map(|(context, v)| OutputToken {
            context,
            value: if props.signed { unpack_signed(v) as i64 } else { v as i64 },
        })
        .collect();

    serde_json::to_writer(io::stdout().lock(), &tokens)?;
    println!();
    Ok(())
}

fn gen_stream(rng: &mut impl Rng, num_tokens: usize, num_contexts: u32) -> Vec<Token> {
    (0..num_tokens)
        .map(|_| {
            let context = rng.gen_range(0..num_contexts);
            Token::new(context, rng.gen_range(0..1u32 << 16) >> rng.gen_range(0..16))
        })
        .collect()
}

fn perf(args: &Args) -> Result<()> {
    let mut rng = rand::thread_rng();
    let num_contexts = args.perf_contexts.max(1);
    let params = EncoderParams { use_prefix_code: args.prefix, ..Default::default() };

    let streams = (0..N_STREAMS)
        .map(|_| {
            let tokens = gen_stream(&mut rng, args.perf_tokens, num_contexts);
            let encoded = EntropyEncoder::encode_token_file(&tokens, num_contexts as usize, params)?;
            Ok((tokens, encoded.os))
        })
        .collect::<Result<Vec<_>>>()?;

    let options = DecoderOptions::default();
    for (tokens, data) in streams.iter() {
        let mut reader = BinaryReader::new(data.clone());
        let (_, stream) = DecodedStream::decode_tokens(&mut reader, num_contexts as usize, tokens.len(), &options)?;
        assert!(stream.values.iter().zip(tokens.iter()).all(|(&v, t)| v == t.value));
    }

    let queries: Vec<usize> = (0..N_QUERIES).map(|_| rng.gen_range(0..N_STREAMS)).collect();

    let total = Instant::now();
    for _ in 0..N_RUNS {
        for &query in queries.iter() {
            let (tokens, data) = &streams[query];
            let mut reader = BinaryReader::new(data.clone());
            let _ = black_box(DecodedStream::decode_tokens(&mut reader, num_contexts as usize, tokens.len(), &options)?);
        }
    }
    let avg = (total.elapsed().as_nanos() as f64) / (N_QUERIES * N_RUNS * args.perf_tokens.max(1)) as f64;
    println!("time per token ({}): {}ns", if args.prefix { "prefix" } else { "ANS" }, avg);

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match (&args.source_name, args.perf) {
        (_, true) => perf(&args),
        (Some(basename), false) => decode(basename),
        (None, false) => Err(Error::Properties("missing source basename".into())),
    }
}
