use serde::{Deserialize, Serialize};

/// Accept a price encoded either as a JSON number or a numeric string.
pub fn string_or_number_to_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::String(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("invalid number")),
        _ => Err(serde::de::Error::custom("invalid numeric value")),
    }
}

/// `{"ticks": "R_50", "subscribe": 1}`
#[derive(Debug, Serialize)]
pub struct TicksSubscribeRequest<'a> {
    pub ticks: &'a str,
    pub subscribe: u8,
}

impl<'a> TicksSubscribeRequest<'a> {
    pub fn new(symbol: &'a str) -> Self {
        Self {
            ticks: symbol,
            subscribe: 1,
        }
    }
}

/// `{"forget": "<subscription id>"}`
#[derive(Debug, Serialize)]
pub struct ForgetRequest<'a> {
    pub forget: &'a str,
}

/// `{"forget_all": "ticks"}`: drops every tick stream on the socket.
#[derive(Debug, Serialize)]
pub struct ForgetAllRequest {
    pub forget_all: &'static str,
}

impl ForgetAllRequest {
    pub fn ticks() -> Self {
        Self { forget_all: "ticks" }
    }
}

#[derive(Debug, Deserialize)]
pub struct DerivTick {
    /// Seconds since the Unix epoch.
    pub epoch: u64,
    #[serde(deserialize_with = "string_or_number_to_f64")]
    pub quote: f64,
    pub symbol: String,
    #[serde(default)]
    pub pip_size: Option<u32>,
    /// Subscription id, used to forget the stream.
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DerivApiError {
    pub code: String,
    pub message: String,
}

/// Any message on the socket; only ticks and errors are of interest.
#[derive(Debug, Deserialize)]
pub struct DerivMessage {
    #[serde(default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub tick: Option<DerivTick>,
    #[serde(default)]
    pub error: Option<DerivApiError>,
}
