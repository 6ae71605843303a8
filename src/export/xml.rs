//! Bot-description XML for an external runner. The document is a fixed
//! template; only the signal-derived fields vary.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::model::signal::{BandLabel, SignalType, TradingSignal};

const MARKET: &str = "synthetic_index";
const SUBMARKET: &str = "random_index";
const TRADE_CATEGORY: &str = "digits";
const DURATION_UNIT: &str = "t";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeType {
    DigitMatch,
    DigitOver,
    DigitUnder,
}

impl TradeType {
    pub fn for_signal(signal: &TradingSignal) -> Option<Self> {
        match signal.signal_type {
            SignalType::ExactDigit => Some(Self::DigitMatch),
            SignalType::OverUnder => match signal.predicted_band? {
                BandLabel::Over2 => Some(Self::DigitOver),
                BandLabel::Under7 => Some(Self::DigitUnder),
            },
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::DigitMatch => "digit_match",
            Self::DigitOver => "digit_over",
            Self::DigitUnder => "digit_under",
        };
        f.write_str(label)
    }
}

/// 5 ticks for one-second index variants, 10 otherwise.
pub fn duration_ticks(symbol: &str) -> u32 {
    let s = symbol.trim().to_ascii_uppercase();
    if s.ends_with("_1S") || s.starts_with("1HZ") {
        5
    } else {
        10
    }
}

fn target(signal: &TradingSignal) -> Option<u8> {
    match signal.signal_type {
        SignalType::ExactDigit => signal.predicted_digit,
        SignalType::OverUnder => signal.predicted_band.map(BandLabel::barrier),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct BotXmlExporter {
    stake: f64,
    currency: String,
}

impl BotXmlExporter {
    pub fn new(stake: f64, currency: &str) -> Self {
        Self {
            stake,
            currency: currency.to_string(),
        }
    }

    /// `None` when the signal is missing the field its type needs.
    pub fn render(&self, signal: &TradingSignal) -> Option<String> {
        let trade_type = TradeType::for_signal(signal)?;
        let target = target(signal)?;
        let symbol = escape(&signal.symbol);
        let duration = duration_ticks(&signal.symbol);

        Some(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<xml xmlns="https://developers.google.com/blockly/xml" is_dbot="true" collection="false">
  <variables></variables>
  <block type="trade_definition" id="trade_definition" deletable="false" x="0" y="0">
    <field name="SIGNAL_ID">{id}</field>
    <statement name="TRADE_OPTIONS">
      <block type="trade_definition_market" deletable="false" movable="false">
        <field name="MARKET_LIST">{market}</field>
        <field name="SUBMARKET_LIST">{submarket}</field>
        <field name="SYMBOL_LIST">{symbol}</field>
        <next>
          <block type="trade_definition_tradetype" deletable="false" movable="false">
            <field name="TRADETYPECAT_LIST">{category}</field>
            <field name="TRADETYPE_LIST">{trade_type}</field>
            <next>
              <block type="trade_definition_tradeoptions" deletable="false" movable="false">
                <field name="DURATIONTYPE_LIST">{unit}</field>
                <field name="CURRENCY_LIST">{currency}</field>
                <value name="DURATION"><shadow type="math_number"><field name="NUM">{duration}</field></shadow></value>
                <value name="AMOUNT"><shadow type="math_number"><field name="NUM">{stake}</field></shadow></value>
                <value name="PREDICTION"><shadow type="math_number"><field name="NUM">{target}</field></shadow></value>
              </block>
            </next>
          </block>
        </next>
      </block>
    </statement>
  </block>
</xml>
"#,
            id = escape(&signal.id),
            market = MARKET,
            submarket = SUBMARKET,
            symbol = symbol,
            category = TRADE_CATEGORY,
            trade_type = trade_type,
            unit = DURATION_UNIT,
            currency = escape(&self.currency),
            duration = duration,
            stake = self.stake,
            target = target,
        ))
    }

    /// Writes `<dir>/<signal id>.xml` and returns the path.
    pub fn write_to_dir(&self, dir: &Path, signal: &TradingSignal) -> Result<PathBuf> {
        let document = self
            .render(signal)
            .with_context(|| format!("signal {} has no exportable outcome", signal.id))?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}.xml", signal.id));
        std::fs::write(&path, document)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
