use std::collections::HashMap;

use serde::{Serialize, Deserialize};

use crate::error::Error;

/// Description of a token file, stored next to it as `<basename>.properties`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StreamProperties {
    pub num_contexts: usize,
    pub num_tokens: usize,
    pub distance_multiplier: u32,
    pub disallow_lz77: bool,
    /// Values were mapped with `pack_signed` before encoding.
    pub signed: bool,
}

impl Default for StreamProperties {
    fn default() -> Self {
        Self {
            num_contexts: 1,
            num_tokens: 0,
            distance_multiplier: 0,
            disallow_lz77: false,
            signed: false,
        }
    }
}

/// Decoder-side policy taken from the stream properties.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DecoderOptions {
    pub distance_multiplier: u32,
    pub disallow_lz77: bool,
}

impl From<&StreamProperties> for DecoderOptions {
    fn from(value: &StreamProperties) -> Self {
        Self {
            distance_multiplier: value.distance_multiplier,
            disallow_lz77: value.disallow_lz77,
        }
    }
}

fn parse_field<T: std::str::FromStr>(value: &HashMap<String, String>, key: &str) -> Result<T, Error> {
    let raw = value.get(key).ok_or_else(|| Error::Properties(format!("Failed in reading {key} from properties")))?;
    raw.trim().parse().map_err(|_| Error::Properties(format!("Malformed {key}: {raw}")))
}

impl TryFrom<HashMap<String, String>> for StreamProperties {
    type Error = Error;

    fn try_from(value: HashMap<String, String>) -> Result<Self, Self::Error> {
        let mut props = StreamProperties {
            num_contexts: parse_field(&value, "contexts")?,
            num_tokens: parse_field(&value, "tokens")?,
            ..Default::default()
        };

        if value.contains_key("distancemultiplier") {
            props.distance_multiplier = parse_field(&value, "distancemultiplier")?;
        }
        if value.contains_key("disallowlz77") {
            props.disallow_lz77 = parse_field(&value, "disallowlz77")?;
        }
        if value.contains_key("signed") {
            props.signed = parse_field(&value, "signed")?;
        }

        if props.num_contexts == 0 {
            return Err(Error::Properties("a stream needs at least one context".into()));
        }

        Ok(props)
    }
}

impl From<StreamProperties> for String {
    fn from(val: StreamProperties) -> Self {
        let mut s = String::new();

        s.push_str("#Entropy-coded token stream properties\n");
        s.push_str("version=0\n");
        s.push_str(&format!("contexts={}\n", val.num_contexts));
        s.push_str(&format!("tokens={}\n", val.num_tokens));
        s.push_str(&format!("distancemultiplier={}\n", val.distance_multiplier));
        s.push_str(&format!("disallowlz77={}\n", val.disallow_lz77));
        s.push_str(&format!("signed={}\n", val.signed));

        s
    }
}
