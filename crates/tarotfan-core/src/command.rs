// ABOUTME: Defines the Command enum representing every request the shell can make of the table.
// ABOUTME: Commands are validated against the session and translated into events by the actor.

use serde::{Deserialize, Serialize};

use crate::card::TapTarget;

/// A request from the shell. Commands are validated and translated into zero
/// or more events by the table actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    StartShuffle,
    SelectCard { index: usize },
    TapCard { index: usize, target: TapTarget },
    RequestNewReading,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::ActionControl;

    #[test]
    fn command_wire_format_is_type_tagged() {
        let json = serde_json::to_value(Command::TapCard {
            index: 2,
            target: TapTarget::Control(ActionControl::Share),
        })
        .unwrap();
        assert_eq!(json["type"], "TapCard");
        assert_eq!(json["index"], 2);
        assert_eq!(json["target"]["kind"], "Control");
        assert_eq!(json["target"]["control"], "Share");

        let parsed: Command = serde_json::from_str(r#"{"type": "SelectCard", "index": 4}"#).unwrap();
        assert!(matches!(parsed, Command::SelectCard { index: 4 }));
    }
}
