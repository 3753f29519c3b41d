use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_VENUE: &str = "Unknown Venue";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub title: String,
    pub venue_name: String,
    pub address: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub source_url: String, // natural key across runs
    pub category: Category,
    pub geo: Option<GeoPoint>,
    pub price: Option<String>,
    pub ticket_details: Vec<TicketDetail>,
    pub rules: Vec<String>,
    pub tags: Vec<String>,
    pub is_approved: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TicketDetail {
    pub name: String,
    pub price: String,
    pub status: TicketStatus,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Available,
    SoldOut,
    #[default]
    Unknown,
}

impl TicketStatus {
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("tükendi") || lower.contains("sold out") || lower.contains("sold_out") {
            TicketStatus::SoldOut
        } else if lower.contains("satışta") || lower.contains("available") || lower.contains("bilet al")
        {
            TicketStatus::Available
        } else {
            TicketStatus::Unknown
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    #[serde(rename = "Müzik")]
    Music,
    #[serde(rename = "Tiyatro")]
    Theatre,
    #[serde(rename = "Stand-Up")]
    StandUp,
    #[serde(rename = "Sanat")]
    Art,
    #[serde(rename = "Festival")]
    Festival,
    #[serde(rename = "Parti")]
    Party,
    #[serde(rename = "Aile")]
    Family,
    #[serde(rename = "Spor")]
    Sports,
    #[serde(rename = "Eğitim")]
    Education,
    #[serde(rename = "Etkinlik")]
    General,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Music,
        Category::Theatre,
        Category::StandUp,
        Category::Art,
        Category::Festival,
        Category::Party,
        Category::Family,
        Category::Sports,
        Category::Education,
        Category::General,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Music => "Müzik",
            Category::Theatre => "Tiyatro",
            Category::StandUp => "Stand-Up",
            Category::Art => "Sanat",
            Category::Festival => "Festival",
            Category::Party => "Parti",
            Category::Family => "Aile",
            Category::Sports => "Spor",
            Category::Education => "Eğitim",
            Category::General => "Etkinlik",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

/// Status of one source inside a run, mirrored into the `scraper_logs` table.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "running" => Some(RunStatus::Running),
            "success" => Some(RunStatus::Success),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}
