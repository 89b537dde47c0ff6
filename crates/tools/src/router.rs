//! Rule-first routing of short Swedish media phrases onto tool calls.
//!
//! The router never executes anything.  It only proposes a [`ToolCall`] that
//! still has to pass registry validation and the safety gate.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Play,
    Pause,
    Stop,
    Next,
    Prev,
    VolumeUp,
    VolumeDown,
    SetVolume,
    Mute,
    Unmute,
    VolumeUpShort,
    VolumeDownShort,
    VolumeMax,
    VolumeMin,
}

const LEXICON: &[(Intent, &[&str])] = &[
    (Intent::Play, &["spela", "spela upp", "starta", "fortsätt"]),
    (Intent::Pause, &["pausa", "lägg på paus"]),
    (Intent::Stop, &["stop", "stopp", "stoppa", "avsluta"]),
    (Intent::Next, &["nästa", "hoppa över"]),
    (Intent::Prev, &["föregående", "gå tillbaka"]),
    (
        Intent::VolumeUp,
        &["höj volymen", "höj volym", "öka volym", "starkare", "högre", "skruva upp"],
    ),
    (
        Intent::VolumeDown,
        &["sänk volymen", "sänk volym", "minska volym", "lägre", "tystare", "skruva ner", "dämpa"],
    ),
    (
        Intent::SetVolume,
        &["volym", "sätt volymen till", "ställ volymen på", "volym procent"],
    ),
    (Intent::Mute, &["mute", "stäng av ljudet", "tysta", "ljud av"]),
    (Intent::Unmute, &["avmuta", "slå på ljud", "ljud på", "avdämpa"]),
    // Short forms for "höj 20%" / "sänk 15%".
    (Intent::VolumeUpShort, &["höj"]),
    (Intent::VolumeDownShort, &["sänk"]),
    (Intent::VolumeMax, &["max", "maximalt", "högsta"]),
    (Intent::VolumeMin, &["min", "minimalt", "tyst"]),
];

/// Lower-case, strip Swedish/Latin diacritics and collapse whitespace.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'å' | 'ä' | 'à' | 'á' | 'â' => 'a',
            'ö' | 'ó' | 'ò' | 'ô' => 'o',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'ü' | 'ú' | 'ù' => 'u',
            'í' | 'ì' | 'ï' => 'i',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity between two already-normalized strings.
fn score_match(input: &str, phrase: &str) -> f32 {
    if input == phrase {
        return 1.0;
    }
    if input.contains(phrase) || phrase.contains(input) {
        return 0.9;
    }
    let a: std::collections::HashSet<&str> = input.split(' ').collect();
    let b: std::collections::HashSet<&str> = phrase.split(' ').collect();
    let overlap = a.intersection(&b).count() as f32 / a.len().max(b.len()) as f32;
    overlap.min(0.85)
}

/// Volume slots found in a phrase.  At most one of the two is set by the
/// level rules; `delta` is only looked for when no level matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolumeSlots {
    pub level: Option<i64>,
    pub delta: Option<i64>,
}

struct VolumePatterns {
    level_pct: Regex,
    level_bare: Regex,
    set_to: Regex,
    max: Regex,
    min: Regex,
    delta_up: Regex,
    delta_down: Regex,
}

static VOLUME: LazyLock<VolumePatterns> = LazyLock::new(|| VolumePatterns {
    level_pct: Regex::new(r"(?:satt|stall)\s*volym(?:en)?\s*(?:till|pa)\s*(\d{1,3})")
        .expect("valid level pattern"),
    level_bare: Regex::new(r"\bvolym(?:en)?\s*(\d{1,3})\b").expect("valid level pattern"),
    set_to: Regex::new(r"\b(hoj|sank)\s*(?:volym(?:en)?)?\s*(?:till|pa)\s*(\d{1,3})")
        .expect("valid level pattern"),
    max: Regex::new(
        r"\bmax(?:imum|imalt)?\b|\bhogsta\b|\b100\s*%|\bhundra\s*procent\b|\bfull\s*volym\b|sa\s*hogt|pa\s*(?:hogsta|max)\b",
    )
    .expect("valid max pattern"),
    min: Regex::new(r"\bmin(?:imum|imalt)?\b|\btyst\b|\b0\s*%|\bnoll\s*procent\b")
        .expect("valid min pattern"),
    delta_up: Regex::new(r"\b(?:hoj|oka|skruva upp)\s*(\d{1,3})?").expect("valid delta pattern"),
    delta_down: Regex::new(r"\b(?:sank|skruva ner|minska|dampa)\s*(\d{1,3})?")
        .expect("valid delta pattern"),
});

fn capture_number(re: &Regex, text: &str, group: usize) -> Option<Option<i64>> {
    re.captures(text)
        .map(|caps| caps.get(group).and_then(|m| m.as_str().parse().ok()))
}

/// Extract volume slots from free text.  Levels are clamped to `0..=100`;
/// a bare "höj"/"sänk" yields a delta of `+10`/`-10`.
pub fn extract_volume_slots(text: &str) -> VolumeSlots {
    let t = normalize(text);
    let p = &*VOLUME;

    let level = capture_number(&p.level_pct, &t, 1)
        .or_else(|| capture_number(&p.level_bare, &t, 1))
        .or_else(|| capture_number(&p.set_to, &t, 2))
        .flatten();
    if let Some(level) = level {
        return VolumeSlots {
            level: Some(level.clamp(0, 100)),
            delta: None,
        };
    }
    if p.max.is_match(&t) {
        return VolumeSlots {
            level: Some(100),
            delta: None,
        };
    }
    if p.min.is_match(&t) {
        return VolumeSlots {
            level: Some(0),
            delta: None,
        };
    }

    let mut delta = None;
    if let Some(up) = capture_number(&p.delta_up, &t, 1) {
        delta = Some(up.unwrap_or(10));
    }
    if let Some(down) = capture_number(&p.delta_down, &t, 1) {
        delta = Some(-down.unwrap_or(10));
    }
    VolumeSlots { level: None, delta }
}

/// A lexicon hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentMatch {
    pub intent: Intent,
    pub score: f32,
    pub phrase: &'static str,
}

#[derive(Debug, Clone)]
pub struct ToolRouter {
    threshold: f32,
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self { threshold: 0.6 }
    }
}

impl ToolRouter {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Best lexicon match at or above the threshold.  Ties keep the earliest
    /// lexicon entry.
    pub fn classify(&self, text: &str) -> Option<IntentMatch> {
        let input = normalize(text);
        if input.is_empty() {
            return None;
        }
        let mut best: Option<IntentMatch> = None;
        for (intent, phrases) in LEXICON {
            for &phrase in phrases.iter() {
                let score = score_match(&input, &normalize(phrase));
                if best.as_ref().is_none_or(|b| score > b.score) {
                    best = Some(IntentMatch {
                        intent: *intent,
                        score,
                        phrase,
                    });
                }
            }
        }
        best.filter(|m| m.score >= self.threshold)
    }

    /// Map free text onto a tool call, or `None` when nothing matches well
    /// enough (or a set-volume phrase carries no level).
    pub fn route(&self, text: &str) -> Option<ToolCall> {
        let matched = self.classify(text)?;
        let call = map_intent(text, matched.intent)?;
        debug!(intent = ?matched.intent, score = matched.score, tool = %call.tool, "routed text");
        Some(call)
    }
}

fn map_intent(text: &str, intent: Intent) -> Option<ToolCall> {
    let bare = |name: &str| Some(ToolCall::new(name, json!({})));
    match intent {
        Intent::Play => bare("PLAY"),
        Intent::Pause => bare("PAUSE"),
        Intent::Stop => bare("STOP"),
        Intent::Next => bare("NEXT"),
        Intent::Prev => bare("PREV"),
        Intent::Mute => bare("MUTE"),
        Intent::Unmute => bare("UNMUTE"),
        Intent::VolumeUp | Intent::VolumeUpShort => {
            let slots = extract_volume_slots(text);
            Some(match slots.level {
                Some(level) => volume_call("level", level),
                None => volume_call("delta", slots.delta.unwrap_or(10)),
            })
        }
        Intent::VolumeDown | Intent::VolumeDownShort => {
            let slots = extract_volume_slots(text);
            Some(match slots.level {
                Some(level) => volume_call("level", level),
                None => volume_call("delta", -slots.delta.unwrap_or(10).abs()),
            })
        }
        Intent::SetVolume => extract_volume_slots(text)
            .level
            .map(|level| volume_call("level", level)),
        Intent::VolumeMax => Some(volume_call("level", 100)),
        Intent::VolumeMin => Some(volume_call("level", 0)),
    }
}

fn volume_call(key: &str, value: i64) -> ToolCall {
    let mut args = serde_json::Map::new();
    args.insert(key.to_string(), json!(value));
    ToolCall::new("SET_VOLUME", serde_json::Value::Object(args))
}
