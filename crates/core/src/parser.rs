//! Turn a proposer's reply into typed commands.
//!
//! A proposer (rule matcher or language model) hands back a free-text message
//! plus zero or more explicit JSON commands.  Explicit commands are built
//! first, then commands implied by phrases in the message, and finally a
//! `voice_response` that speaks the message itself.

use serde_json::Value;
use tracing::warn;

use crate::command::{Command, CommandBody, HudModule, MediaAction};

struct TextPattern {
    phrases: &'static [&'static str],
    build: fn() -> CommandBody,
}

const TEXT_PATTERNS: &[TextPattern] = &[
    TextPattern {
        phrases: &["öppna kalender", "visa kalender", "open calendar", "show calendar"],
        build: || CommandBody::OpenModule { module: HudModule::Calendar },
    },
    TextPattern {
        phrases: &["öppna mail", "visa mail", "öppna e-post", "open mail", "show mail"],
        build: || CommandBody::OpenModule { module: HudModule::Mail },
    },
    TextPattern {
        phrases: &["öppna ekonomi", "visa ekonomi", "open finance", "show finance"],
        build: || CommandBody::OpenModule { module: HudModule::Finance },
    },
    TextPattern {
        phrases: &["stäng modul", "stäng fönster", "close module", "close window"],
        build: || CommandBody::CloseModule,
    },
    TextPattern {
        phrases: &["systemstatus", "visa system", "hur mår systemet", "system status"],
        build: || CommandBody::SystemStatus { detailed: true },
    },
    TextPattern {
        phrases: &["visa väder", "hur är vädret", "show weather"],
        build: || CommandBody::ShowWeather { location: None },
    },
    TextPattern {
        phrases: &["spela musik", "starta musik", "play music"],
        build: || CommandBody::PlayMedia { action: MediaAction::Play },
    },
    TextPattern {
        phrases: &["pausa musik", "stoppa musik", "pause music"],
        build: || CommandBody::PlayMedia { action: MediaAction::Pause },
    },
    TextPattern {
        phrases: &["nästa låt", "nästa spår", "next track", "next song"],
        build: || CommandBody::PlayMedia { action: MediaAction::Next },
    },
];

/// Commands implied by phrases in `text`, in pattern-table order.  Each
/// pattern contributes at most one command.
pub fn commands_from_text(text: &str) -> Vec<Command> {
    let lowered = text.to_lowercase();
    TEXT_PATTERNS
        .iter()
        .filter(|pattern| pattern.phrases.iter().any(|phrase| lowered.contains(phrase)))
        .map(|pattern| Command::new((pattern.build)()))
        .collect()
}

/// Build the full command list for one proposer reply.
///
/// Explicit commands that fail to parse are skipped with a warning; they never
/// abort the rest of the reply.
pub fn parse_proposal(message: &str, explicit: &[Value]) -> Vec<Command> {
    let mut commands = Vec::new();

    for raw in explicit {
        match Command::from_value(raw) {
            Ok(command) => commands.push(command),
            Err(err) => warn!(error = %err, "skipping proposed command"),
        }
    }

    commands.extend(commands_from_text(message));

    let spoken = message.trim();
    if !spoken.is_empty() {
        commands.push(Command::new(CommandBody::VoiceResponse {
            text: spoken.to_string(),
            voice: "sv-SE".to_string(),
        }));
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use serde_json::json;

    fn kinds(commands: &[Command]) -> Vec<CommandKind> {
        commands.iter().map(Command::kind).collect()
    }

    #[test]
    fn swedish_phrases_map_to_commands() {
        let cmds = commands_from_text("Kan du öppna kalender och visa väder?");
        assert_eq!(kinds(&cmds), vec![CommandKind::OpenModule, CommandKind::ShowWeather]);
        assert_eq!(cmds[0].body, CommandBody::OpenModule { module: HudModule::Calendar });
    }

    #[test]
    fn matching_is_case_insensitive() {
        let cmds = commands_from_text("NÄSTA LÅT tack");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].body, CommandBody::PlayMedia { action: MediaAction::Next });
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(commands_from_text("vad heter du?").is_empty());
    }

    #[test]
    fn proposal_orders_explicit_then_text_then_voice() {
        let cmds = parse_proposal(
            "Självklart, spela musik nu.",
            &[json!({"action": "set_theme", "theme": "red"})],
        );
        assert_eq!(
            kinds(&cmds),
            vec![CommandKind::SetTheme, CommandKind::PlayMedia, CommandKind::VoiceResponse]
        );
        match &cmds[2].body {
            CommandBody::VoiceResponse { text, voice } => {
                assert_eq!(text, "Självklart, spela musik nu.");
                assert_eq!(voice, "sv-SE");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn bad_explicit_commands_are_skipped() {
        let cmds = parse_proposal(
            "",
            &[json!({"action": "launch_rocket"}), json!({"action": "close_module"})],
        );
        assert_eq!(kinds(&cmds), vec![CommandKind::CloseModule]);
    }

    #[test]
    fn blank_message_adds_no_voice_response() {
        assert!(parse_proposal("   ", &[]).is_empty());
    }
}
