use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tone {
    Professional,
    Conversational,
    Enthusiastic,
    Humorous,
    Custom(String),
}

/// Tone-driven text shared by the generation prompt, previews and rendered
/// deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ToneProfile {
    pub voice: &'static str,
    pub heading: &'static str,
    pub intro: &'static str,
    pub bullet: &'static str,
    pub closing: &'static str,
}

const PROFESSIONAL: ToneProfile = ToneProfile {
    voice: "professional, authoritative and concise",
    heading: "Industry Briefing",
    intro: "Here are today's curated insights for your audience.",
    bullet: "▪",
    closing: "Share the option that best reflects your expertise.",
};

const CONVERSATIONAL: ToneProfile = ToneProfile {
    voice: "friendly, conversational and approachable",
    heading: "Your Daily Content Picks",
    intro: "We put together a few ideas you can post today.",
    bullet: "•",
    closing: "Pick the one that sounds most like you and hit post!",
};

const ENTHUSIASTIC: ToneProfile = ToneProfile {
    voice: "energetic, enthusiastic and upbeat",
    heading: "Fresh Ideas Are Here!",
    intro: "Get ready, today's content is packed with energy!",
    bullet: "★",
    closing: "Go share it and light up your feed!",
};

const HUMOROUS: ToneProfile = ToneProfile {
    voice: "witty, light-hearted and humorous while staying on topic",
    heading: "Content, Served With a Smile",
    intro: "Your audience deserves a laugh and a lesson. Here you go.",
    bullet: "→",
    closing: "Post one, and may the algorithm be ever in your favor.",
};

pub fn profile(tone: &Tone) -> &'static ToneProfile {
    match tone {
        Tone::Professional | Tone::Custom(_) => &PROFESSIONAL,
        Tone::Conversational => &CONVERSATIONAL,
        Tone::Enthusiastic => &ENTHUSIASTIC,
        Tone::Humorous => &HUMOROUS,
    }
}

impl Tone {
    /// Parses a stored or submitted tone. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let tone = match trimmed.to_ascii_lowercase().as_str() {
            "professional" => Tone::Professional,
            "conversational" => Tone::Conversational,
            "enthusiastic" => Tone::Enthusiastic,
            "humorous" => Tone::Humorous,
            _ => Tone::Custom(trimmed.to_string()),
        };
        Some(tone)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Tone::Professional => "professional",
            Tone::Conversational => "conversational",
            Tone::Enthusiastic => "enthusiastic",
            Tone::Humorous => "humorous",
            Tone::Custom(text) => text,
        }
    }

    /// Voice description embedded in the generation system instruction.
    pub fn voice(&self) -> String {
        match self {
            Tone::Custom(text) => text.clone(),
            other => profile(other).voice.to_string(),
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Tone {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tone {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Tone::parse(&raw).ok_or_else(|| de::Error::custom("tone must not be empty"))
    }
}
