//! Turns generated artifacts into the delivery email.
//!
//! The handlebars templates under `templates/email` hold the markup: a layout
//! per body type, one partial per style and a shared list partial. The format
//! picks the list markers and tone-specific wording comes from
//! [`crate::tone::profile`].

use chrono::NaiveDate;
use handlebars::{no_escape, Handlebars, TemplateError};
use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;

use crate::{
    generation::{extract_artifact, ContentArtifact},
    template::{ContentFormat, ContentStyle, Template},
    tone::{profile, Tone, ToneProfile},
};

const X_POINT_MAX_CHARS: usize = 280;
const FOOTER_NOTICE: &str =
    "You are receiving this email because content delivery is enabled in your preferences.";

const PARTIALS: [(&str, &str, &str); 5] = [
    (
        "list",
        include_str!("../templates/email/list.html.hbs"),
        include_str!("../templates/email/list.txt.hbs"),
    ),
    (
        "x_style",
        include_str!("../templates/email/x_style.html.hbs"),
        include_str!("../templates/email/x_style.txt.hbs"),
    ),
    (
        "linkedin_style",
        include_str!("../templates/email/linkedin_style.html.hbs"),
        include_str!("../templates/email/linkedin_style.txt.hbs"),
    ),
    (
        "newsletter_style",
        include_str!("../templates/email/newsletter_style.html.hbs"),
        include_str!("../templates/email/newsletter_style.txt.hbs"),
    ),
    (
        "thought_leadership",
        include_str!("../templates/email/thought_leadership.html.hbs"),
        include_str!("../templates/email/thought_leadership.txt.hbs"),
    ),
];

static TEMPLATES: Lazy<Result<EmailTemplates, String>> =
    Lazy::new(|| EmailTemplates::load().map_err(|err| err.to_string()));

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("email templates failed to load: {0}")]
    Setup(String),
    #[error("failed to render email: {0}")]
    Template(#[from] handlebars::RenderError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedDelivery {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// HTML bodies use the default escaping; the text registry leaves values
/// untouched.
struct EmailTemplates {
    html: Handlebars<'static>,
    text: Handlebars<'static>,
}

impl EmailTemplates {
    fn load() -> Result<Self, TemplateError> {
        let mut html = Handlebars::new();
        let mut text = Handlebars::new();
        text.register_escape_fn(no_escape);

        html.register_template_string(
            "delivery",
            include_str!("../templates/email/delivery.html.hbs"),
        )?;
        text.register_template_string(
            "delivery",
            include_str!("../templates/email/delivery.txt.hbs"),
        )?;
        text.register_template_string(
            "subject",
            include_str!("../templates/email/subject.txt.hbs"),
        )?;
        for (name, html_source, text_source) in PARTIALS {
            html.register_partial(name, html_source)?;
            text.register_partial(name, text_source)?;
        }

        Ok(Self { html, text })
    }
}

#[derive(Debug, Serialize)]
struct DeliveryView<'a> {
    subject: String,
    date: String,
    industry: &'a str,
    tone: &'static ToneProfile,
    footer: &'static str,
    options: Vec<OptionView>,
}

#[derive(Debug, Default, Serialize)]
struct OptionView {
    number: usize,
    title: String,
    x_style: bool,
    linkedin_style: bool,
    newsletter_style: bool,
    thought_leadership: bool,
    lead: Option<String>,
    insight: Option<String>,
    hashtags: Option<String>,
    points: PointList,
}

#[derive(Debug, Default, Serialize)]
struct PointList {
    bullets: bool,
    numbered: bool,
    tips: bool,
    items: Vec<ListItem>,
}

#[derive(Debug, Serialize)]
struct ListItem {
    marker: String,
    text: String,
}

pub fn render_delivery(
    template: Template,
    tone: &Tone,
    industry: &str,
    artifacts: &[ContentArtifact],
    date: NaiveDate,
) -> Result<RenderedDelivery, RenderError> {
    let templates = TEMPLATES
        .as_ref()
        .map_err(|err| RenderError::Setup(err.clone()))?;
    let profile = profile(tone);

    let mut view = DeliveryView {
        subject: String::new(),
        date: date.format("%B %-d, %Y").to_string(),
        industry,
        tone: profile,
        footer: FOOTER_NOTICE,
        options: artifacts
            .iter()
            .enumerate()
            .map(|(index, artifact)| option_view(template, profile, industry, index + 1, artifact))
            .collect(),
    };
    view.subject = templates.text.render("subject", &view)?.trim().to_string();

    Ok(RenderedDelivery {
        html: templates.html.render("delivery", &view)?,
        text: templates.text.render("delivery", &view)?,
        subject: view.subject,
    })
}

/// Renders the delivery layout with placeholder content, without calling the
/// generation provider.
pub fn render_preview(
    template: Template,
    tone: &Tone,
    industry: &str,
    date: NaiveDate,
) -> Result<RenderedDelivery, RenderError> {
    let profile = profile(tone);
    let samples: Vec<ContentArtifact> = (1..=3)
        .map(|n| {
            let raw = format!(
                "Sample idea {n} for {industry}\n\
                 {intro}\n\
                 A key development shaping {industry} this week.\n\
                 One practical step your audience can take today.\n\
                 {closing}",
                intro = profile.intro,
                closing = profile.closing,
            );
            extract_artifact(&raw, industry)
        })
        .collect();
    render_delivery(template, tone, industry, &samples, date)
}

fn option_view(
    template: Template,
    profile: &ToneProfile,
    industry: &str,
    number: usize,
    artifact: &ContentArtifact,
) -> OptionView {
    let mut points = split_points(&artifact.body);
    let mut view = OptionView {
        number,
        title: artifact.title.clone(),
        ..OptionView::default()
    };

    match template.style {
        ContentStyle::XStyle => {
            points.truncate(3);
            for point in points.iter_mut() {
                *point = truncate_chars(point, X_POINT_MAX_CHARS);
            }
            view.x_style = true;
            view.hashtags = Some(hashtags(industry));
        }
        ContentStyle::LinkedinStyle => view.linkedin_style = true,
        ContentStyle::NewsletterStyle => {
            view.newsletter_style = true;
            if !points.is_empty() {
                view.lead = Some(points.remove(0));
            }
        }
        ContentStyle::ThoughtLeadership => {
            view.thought_leadership = true;
            if points.len() > 1 {
                view.insight = points.pop();
            }
        }
    }

    view.points = point_list(template.format, profile, points);
    view
}

fn point_list(format: ContentFormat, profile: &ToneProfile, points: Vec<String>) -> PointList {
    let items = points
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let number = index + 1;
            let marker = match format {
                ContentFormat::BulletPoints => profile.bullet.to_string(),
                ContentFormat::NumberedList => format!("{number}."),
                ContentFormat::TipsFormat => format!("Tip {number}:"),
            };
            ListItem { marker, text }
        })
        .collect();

    PointList {
        bullets: format == ContentFormat::BulletPoints,
        numbered: format == ContentFormat::NumberedList,
        tips: format == ContentFormat::TipsFormat,
        items,
    }
}

/// Breaks a body into list points, dropping any list markers the model added.
fn split_points(body: &str) -> Vec<String> {
    let lines: Vec<String> = body
        .lines()
        .map(strip_marker)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() > 1 {
        return lines;
    }

    let single = lines.into_iter().next().unwrap_or_default();
    single
        .split_inclusive(". ")
        .map(|sentence| sentence.trim().to_string())
        .filter(|sentence| !sentence.is_empty())
        .collect()
}

fn strip_marker(line: &str) -> String {
    let trimmed = line.trim();
    let without_bullet = trimmed.trim_start_matches(['-', '*', '•', '▪', '★', '→']);
    let without_number = match without_bullet.split_once(['.', ')']) {
        Some((prefix, rest))
            if !prefix.is_empty() && prefix.len() <= 2 && prefix.chars().all(|c| c.is_ascii_digit()) =>
        {
            rest
        }
        _ => without_bullet,
    };
    without_number.replace("**", "").trim().to_string()
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let head: String = value.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", head.trim_end())
}

fn hashtags(industry: &str) -> String {
    let tag: String = industry
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars().filter(|c| c.is_alphanumeric());
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if tag.is_empty() {
        "#Insights".to_string()
    } else {
        format!("#{tag} #Insights")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> Vec<ContentArtifact> {
        vec![
            extract_artifact("First Title\n- alpha point\n- beta point\n- gamma point", "Fintech"),
            extract_artifact("Second Title\n1. one\n2. two", "Fintech"),
            extract_artifact("Third Title\nSingle sentence. Another sentence.", "Fintech"),
        ]
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()
    }

    #[test]
    fn every_combination_has_header_sections_and_footer() {
        let tone = Tone::Conversational;
        let profile = profile(&tone);
        for template in Template::all() {
            let rendered =
                render_delivery(template, &tone, "Fintech", &artifacts(), date()).unwrap();
            assert!(rendered.html.contains(profile.heading), "{template}");
            assert!(rendered.html.contains("March 14, 2024"), "{template}");
            assert!(rendered.html.contains("First Title"), "{template}");
            assert!(rendered.html.contains("Third Title"), "{template}");
            assert!(rendered.html.contains(profile.closing), "{template}");
            assert!(rendered.html.trim_end().ends_with("</html>"), "{template}");
            assert!(rendered.text.contains("Second Title"), "{template}");
        }
    }

    #[test]
    fn format_controls_list_structure() {
        let tone = Tone::Professional;
        let bullets = render_delivery(
            Template::new(ContentFormat::BulletPoints, ContentStyle::LinkedinStyle),
            &tone,
            "Fintech",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(bullets.html.contains("<ul"));
        assert!(bullets.text.contains("▪ alpha point"));

        let numbered = render_delivery(
            Template::new(ContentFormat::NumberedList, ContentStyle::LinkedinStyle),
            &tone,
            "Fintech",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(numbered.html.contains("<ol>"));
        assert!(numbered.text.contains("2. beta point"));

        let tips = render_delivery(
            Template::new(ContentFormat::TipsFormat, ContentStyle::LinkedinStyle),
            &tone,
            "Fintech",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(tips.html.contains("<strong>Tip 1:</strong> alpha point"));
    }

    #[test]
    fn style_controls_layout() {
        let tone = Tone::Professional;
        let x = render_delivery(
            Template::new(ContentFormat::BulletPoints, ContentStyle::XStyle),
            &tone,
            "Supply Chain",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(x.html.contains("#SupplyChain #Insights"));

        let newsletter = render_delivery(
            Template::new(ContentFormat::BulletPoints, ContentStyle::NewsletterStyle),
            &tone,
            "Fintech",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(newsletter.html.contains("Section 2: Second Title"));

        let thought = render_delivery(
            Template::new(ContentFormat::BulletPoints, ContentStyle::ThoughtLeadership),
            &tone,
            "Fintech",
            &artifacts(),
            date(),
        )
        .unwrap();
        assert!(thought.html.contains("Key insight:</strong> gamma point"));
    }

    #[test]
    fn tone_supplies_wording() {
        let template = Template::default();
        let humorous =
            render_delivery(template, &Tone::Humorous, "Fintech", &artifacts(), date()).unwrap();
        let enthusiastic =
            render_delivery(template, &Tone::Enthusiastic, "Fintech", &artifacts(), date())
                .unwrap();
        assert!(humorous.subject.starts_with(profile(&Tone::Humorous).heading));
        assert!(enthusiastic.html.contains(profile(&Tone::Enthusiastic).closing));
        assert_ne!(humorous.html, enthusiastic.html);
    }

    #[test]
    fn escapes_model_output() {
        let artifact = extract_artifact("<script>alert(1)</script>\nbody & more", "Fintech");
        let rendered = render_delivery(
            Template::default(),
            &Tone::Professional,
            "Fintech",
            &[artifact],
            date(),
        )
        .unwrap();
        assert!(!rendered.html.contains("<script>"));
        assert!(rendered.html.contains("&lt;script&gt;"));
        assert!(rendered.html.contains("body &amp; more"));
        assert!(rendered.text.contains("body & more"));
        assert!(!rendered.subject.contains("&amp;"));
    }

    #[test]
    fn x_style_caps_point_length() {
        let long = format!("Title\n{}", "word ".repeat(100));
        let rendered = render_delivery(
            Template::new(ContentFormat::NumberedList, ContentStyle::XStyle),
            &Tone::Professional,
            "Fintech",
            &[extract_artifact(&long, "Fintech")],
            date(),
        )
        .unwrap();
        let point_line = rendered
            .text
            .lines()
            .find(|line| line.starts_with("1. "))
            .unwrap();
        assert!(point_line.chars().count() <= X_POINT_MAX_CHARS + 3);
        assert!(point_line.ends_with('…'));
    }

    #[test]
    fn rendering_is_deterministic() {
        let template = Template::new(ContentFormat::TipsFormat, ContentStyle::NewsletterStyle);
        let render = || {
            render_delivery(template, &Tone::Professional, "Fintech", &artifacts(), date()).unwrap()
        };
        assert_eq!(render(), render());
    }

    #[test]
    fn preview_renders_without_provider() {
        let preview =
            render_preview(Template::default(), &Tone::Humorous, "Retail", date()).unwrap();
        assert!(preview.html.contains("Sample idea 1 for Retail"));
        assert!(preview.html.contains(profile(&Tone::Humorous).heading));
    }

    #[test]
    fn strips_list_markers() {
        assert_eq!(strip_marker("- item"), "item");
        assert_eq!(strip_marker("12) item"), "item");
        assert_eq!(strip_marker("3. **bold** item"), "bold item");
        assert_eq!(strip_marker("2024 was big."), "2024 was big.");
    }
}
