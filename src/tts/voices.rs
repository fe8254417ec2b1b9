//! Voice catalog for the Kokoro model.
//!
//! Static table of the voices the model ships with, keyed by the identifier
//! passed to the synthesizer. The first two letters of an id encode the
//! language (`a` American English, `b` British English, `e` Spanish, `f`
//! French, `h` Hindi, `i` Italian, `p` Brazilian Portuguese) and gender.

use crate::defaults::DEFAULT_VOICE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Female => write!(f, "Female"),
            Gender::Male => write!(f, "Male"),
        }
    }
}

/// Metadata for one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceInfo {
    /// Identifier passed to the model (e.g., "af_heart")
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// BCP-47-ish language tag
    pub language: &'static str,
    pub gender: Gender,
    /// Upstream quality grade, "A" best to "F" worst
    pub quality: &'static str,
}

const fn voice(
    id: &'static str,
    name: &'static str,
    language: &'static str,
    gender: Gender,
    quality: &'static str,
) -> VoiceInfo {
    VoiceInfo {
        id,
        name,
        language,
        gender,
        quality,
    }
}

/// Catalog of available voices.
pub const VOICES: &[VoiceInfo] = &[
    voice("af_heart", "Heart", "en-us", Gender::Female, "A"),
    voice("af_alloy", "Alloy", "en-us", Gender::Female, "C"),
    voice("af_aoede", "Aoede", "en-us", Gender::Female, "C+"),
    voice("af_bella", "Bella", "en-us", Gender::Female, "A-"),
    voice("af_jessica", "Jessica", "en-us", Gender::Female, "D"),
    voice("af_kore", "Kore", "en-us", Gender::Female, "C+"),
    voice("af_nicole", "Nicole", "en-us", Gender::Female, "B-"),
    voice("af_nova", "Nova", "en-us", Gender::Female, "C"),
    voice("af_river", "River", "en-us", Gender::Female, "D"),
    voice("af_sarah", "Sarah", "en-us", Gender::Female, "C+"),
    voice("af_sky", "Sky", "en-us", Gender::Female, "C-"),
    voice("am_adam", "Adam", "en-us", Gender::Male, "F+"),
    voice("am_echo", "Echo", "en-us", Gender::Male, "D"),
    voice("am_eric", "Eric", "en-us", Gender::Male, "D"),
    voice("am_fenrir", "Fenrir", "en-us", Gender::Male, "C+"),
    voice("am_liam", "Liam", "en-us", Gender::Male, "D"),
    voice("am_michael", "Michael", "en-us", Gender::Male, "C+"),
    voice("am_onyx", "Onyx", "en-us", Gender::Male, "D"),
    voice("am_puck", "Puck", "en-us", Gender::Male, "C+"),
    voice("am_santa", "Santa", "en-us", Gender::Male, "D-"),
    voice("bf_emma", "Emma", "en-gb", Gender::Female, "B-"),
    voice("bf_isabella", "Isabella", "en-gb", Gender::Female, "C"),
    voice("bf_alice", "Alice", "en-gb", Gender::Female, "D"),
    voice("bf_lily", "Lily", "en-gb", Gender::Female, "D"),
    voice("bm_george", "George", "en-gb", Gender::Male, "C"),
    voice("bm_lewis", "Lewis", "en-gb", Gender::Male, "D+"),
    voice("bm_daniel", "Daniel", "en-gb", Gender::Male, "D"),
    voice("bm_fable", "Fable", "en-gb", Gender::Male, "C"),
    voice("ef_dora", "Dora", "es", Gender::Female, "C"),
    voice("em_alex", "Alex", "es", Gender::Male, "C"),
    voice("em_santa", "Santa", "es", Gender::Male, "D"),
    voice("ff_siwis", "Siwis", "fr", Gender::Female, "B-"),
    voice("hf_alpha", "Alpha", "hi", Gender::Female, "C"),
    voice("hf_beta", "Beta", "hi", Gender::Female, "C"),
    voice("hm_omega", "Omega", "hi", Gender::Male, "C"),
    voice("hm_psi", "Psi", "hi", Gender::Male, "C"),
    voice("if_sara", "Sara", "it", Gender::Female, "C"),
    voice("im_nicola", "Nicola", "it", Gender::Male, "C"),
    voice("pf_dora", "Dora", "pt-br", Gender::Female, "C"),
    voice("pm_alex", "Alex", "pt-br", Gender::Male, "C"),
    voice("pm_santa", "Santa", "pt-br", Gender::Male, "D"),
];

/// Owned voice description carried in status responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSummary {
    pub id: String,
    pub name: String,
    pub language: String,
    pub gender: Gender,
    pub quality: String,
}

impl From<&VoiceInfo> for VoiceSummary {
    fn from(info: &VoiceInfo) -> Self {
        Self {
            id: info.id.to_string(),
            name: info.name.to_string(),
            language: info.language.to_string(),
            gender: info.gender,
            quality: info.quality.to_string(),
        }
    }
}

/// Look up a voice by identifier. Case sensitive.
pub fn get_voice(id: &str) -> Option<&'static VoiceInfo> {
    VOICES.iter().find(|v| v.id == id)
}

pub fn list_voices() -> &'static [VoiceInfo] {
    VOICES
}

/// Summaries of every voice, in catalog order.
pub fn voice_summaries() -> Vec<VoiceSummary> {
    VOICES.iter().map(VoiceSummary::from).collect()
}

/// The default voice, `af_heart`.
pub fn default_voice() -> &'static VoiceInfo {
    get_voice(DEFAULT_VOICE).unwrap_or(&VOICES[0])
}
