use crate::coordinator::CoordinatorCommand;
use crate::model::signal::SignalStatus;

fn parse_status(word: &str) -> Option<SignalStatus> {
    match word.to_ascii_lowercase().as_str() {
        "pending" => Some(SignalStatus::Pending),
        "executed" => Some(SignalStatus::Executed),
        "won" => Some(SignalStatus::Won),
        "lost" => Some(SignalStatus::Lost),
        "cancelled" | "canceled" => Some(SignalStatus::Cancelled),
        _ => None,
    }
}

/// Operator command from one line of stdin:
///
/// - `on` / `off`: toggle active trading
/// - `force <SYMBOL>`: generate from the latest run
/// - `sub <SYMBOL>` / `unsub <SYMBOL>`
/// - `status <SIGNAL_ID> <pending|executed|won|lost|cancelled>`
pub fn parse_command(line: &str) -> Option<CoordinatorCommand> {
    let mut words = line.split_whitespace();
    let verb = words.next()?.to_ascii_lowercase();
    let arg = words.next();
    let command = match (verb.as_str(), arg) {
        ("on", None) => CoordinatorCommand::SetActiveTrading(true),
        ("off", None) => CoordinatorCommand::SetActiveTrading(false),
        ("force" | "f", Some(symbol)) => {
            CoordinatorCommand::ForceGenerate(symbol.to_ascii_uppercase())
        }
        ("sub" | "subscribe", Some(symbol)) => {
            CoordinatorCommand::Subscribe(symbol.to_ascii_uppercase())
        }
        ("unsub" | "unsubscribe", Some(symbol)) => {
            CoordinatorCommand::Unsubscribe(symbol.to_ascii_uppercase())
        }
        ("status", Some(id)) => CoordinatorCommand::SetSignalStatus {
            id: id.to_string(),
            status: parse_status(words.next()?)?,
        },
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(command)
}
