pub mod xml;

pub use xml::{duration_ticks, BotXmlExporter, TradeType};
