use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Separator used by the legacy `"{format}-style-{style}"` encoding.
const LEGACY_SEPARATOR: &str = "-style-";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown template format `{0}`")]
    UnknownFormat(String),
    #[error("unknown template style `{0}`")]
    UnknownStyle(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentFormat {
    BulletPoints,
    NumberedList,
    TipsFormat,
}

impl ContentFormat {
    pub const ALL: [ContentFormat; 3] = [
        ContentFormat::BulletPoints,
        ContentFormat::NumberedList,
        ContentFormat::TipsFormat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentFormat::BulletPoints => "bullet-points",
            ContentFormat::NumberedList => "numbered-list",
            ContentFormat::TipsFormat => "tips-format",
        }
    }
}

impl FromStr for ContentFormat {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bullet-points" => Ok(ContentFormat::BulletPoints),
            "numbered-list" => Ok(ContentFormat::NumberedList),
            "tips-format" => Ok(ContentFormat::TipsFormat),
            other => Err(TemplateError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentStyle {
    XStyle,
    LinkedinStyle,
    NewsletterStyle,
    ThoughtLeadership,
}

impl ContentStyle {
    pub const ALL: [ContentStyle; 4] = [
        ContentStyle::XStyle,
        ContentStyle::LinkedinStyle,
        ContentStyle::NewsletterStyle,
        ContentStyle::ThoughtLeadership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStyle::XStyle => "x-style",
            ContentStyle::LinkedinStyle => "linkedin-style",
            ContentStyle::NewsletterStyle => "newsletter-style",
            ContentStyle::ThoughtLeadership => "thought-leadership",
        }
    }
}

impl FromStr for ContentStyle {
    type Err = TemplateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "x-style" => Ok(ContentStyle::XStyle),
            "linkedin-style" => Ok(ContentStyle::LinkedinStyle),
            "newsletter-style" => Ok(ContentStyle::NewsletterStyle),
            "thought-leadership" => Ok(ContentStyle::ThoughtLeadership),
            other => Err(TemplateError::UnknownStyle(other.to_string())),
        }
    }
}

/// Rendering shape of a delivery: how items are listed and how the email is
/// laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Template {
    pub format: ContentFormat,
    pub style: ContentStyle,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            format: ContentFormat::BulletPoints,
            style: ContentStyle::XStyle,
        }
    }
}

impl Template {
    pub fn new(format: ContentFormat, style: ContentStyle) -> Self {
        Self { format, style }
    }

    /// Parses the legacy `"{format}-style-{style}"` identifier. A value without
    /// the separator is taken as a bare format with the `x-style` layout.
    pub fn parse_legacy(raw: &str) -> Result<Self, TemplateError> {
        let raw = raw.trim();
        match raw.find(LEGACY_SEPARATOR) {
            Some(index) => {
                let format = raw[..index].parse()?;
                let style = raw[index + LEGACY_SEPARATOR.len()..].parse()?;
                Ok(Self { format, style })
            }
            None => Ok(Self {
                format: raw.parse()?,
                style: ContentStyle::XStyle,
            }),
        }
    }

    pub fn from_parts(format: &str, style: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            format: format.parse()?,
            style: style.parse()?,
        })
    }

    pub fn all() -> impl Iterator<Item = Template> {
        ContentFormat::ALL.into_iter().flat_map(|format| {
            ContentStyle::ALL
                .into_iter()
                .map(move |style| Template { format, style })
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.format.as_str(),
            LEGACY_SEPARATOR,
            self.style.as_str()
        )
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Template::parse_legacy(&raw).map_err(de::Error::custom)
    }
}
