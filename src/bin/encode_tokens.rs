use std::{fs, time::Instant};

use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ans_rust::{
    ans::{EncoderParams, EntropyEncoder, HybridUintConfig, Lz77Params, Token},
    utils::pack_signed,
    Error, Result, StreamProperties,
};

#[derive(Parser, Debug)]
#[command(about = "Entropy-code a JSON list of tokens into <dest_name>.ans and <dest_name>.properties")]
struct Args {
    /// JSON file holding a list of `{ "context": c, "value": v }` tokens
    source_name: String,
    /// The destination basename
    dest_name: String,
    /// Number of contexts; by default one more than the largest context in the input
    #[arg(short, long)]
    contexts: Option<usize>,
    /// Use prefix codes instead of ANS
    #[arg(long)]
    prefix: bool,
    /// Log2 of the ANS alphabet size, 5 to 8
    #[arg(long, default_value_t = 8)]
    log_alpha_size: u32,
    /// Replace runs of repeated values with LZ77 copies
    #[arg(long)]
    lz77: bool,
    /// Row stride of the special LZ77 distances, 0 to disable them
    #[arg(long, default_value_t = 0)]
    distance_multiplier: u32,
    /// The values are signed integers
    #[arg(long)]
    signed: bool,
    /// JSON file with the full encoder parameters, overriding the flags above
    #[arg(long)]
    params: Option<String>,
}

#[derive(Deserialize, Debug)]
struct InputToken {
    context: u32,
    value: i64,
}

fn to_token(t: &InputToken, signed: bool) -> Result<Token> {
    let value = if signed {
        i32::try_from(t.value).map(pack_signed)
    } else {
        u32::try_from(t.value)
    };
    let value = value.map_err(|_| Error::InvalidEncoderInput(format!("value {} out of range", t.value)))?;
    Ok(Token::new(t.context, value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let input: Vec<InputToken> = serde_json::from_str(&fs::read_to_string(&args.source_name)?)?;
    let tokens = input.iter().map(|t| to_token(t, args.signed)).collect::<Result<Vec<_>>>()?;
    let num_contexts = args.contexts
        .unwrap_or_else(|| tokens.iter().map(|t| t.context as usize + 1).max().unwrap_or(1));

    let params = match &args.params {
        Some(path) => serde_json::from_str::<EncoderParams>(&fs::read_to_string(path)?)?,
        None => EncoderParams {
            use_prefix_code: args.prefix,
            log_alpha_size: args.log_alpha_size,
            lz77: if args.lz77 { Lz77Params::new(224, 3, HybridUintConfig::new(0, 0, 0)) } else { Lz77Params::default() },
            distance_multiplier: args.distance_multiplier,
            ..Default::default()
        },
    };
    info!(num_tokens = tokens.len(), num_contexts, ?params, "encoding");

    let comp_time = Instant::now();
    let encoded = EntropyEncoder::encode_token_file(&tokens, num_contexts, params)?;
    let comp_time = comp_time.elapsed().as_nanos() as f64;

    let props = StreamProperties {
        num_contexts,
        num_tokens: tokens.len(),
        distance_multiplier: params.distance_multiplier,
        disallow_lz77: !params.lz77.enabled,
        signed: args.signed,
    };
    fs::write(format!("{}.ans", args.dest_name), &encoded.os)?;
    fs::write(format!("{}.properties", args.dest_name), String::from(props))?;

    println!("encoded {} tokens in {} bytes, {}ns", tokens.len(), encoded.os.len(), comp_time);
    Ok(())
}
