use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::portal::availability::parse_availability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CourseStatus {
    Open,
    Closed,
    Waitlist,
}

impl CourseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourseStatus::Open => "Open",
            CourseStatus::Closed => "Closed",
            CourseStatus::Waitlist => "Waitlist",
        }
    }

    /// Lenient parse for scraped text. Anything unrecognised is `Closed`.
    pub fn from_scraped(text: &str) -> Self {
        text.parse().unwrap_or(CourseStatus::Closed)
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(CourseStatus::Open),
            "closed" => Ok(CourseStatus::Closed),
            "waitlist" | "waitlisted" => Ok(CourseStatus::Waitlist),
            other => Err(format!("unknown course status: {}", other)),
        }
    }
}

/// Last known state of a course, keyed by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSnapshot {
    pub code: String,
    pub name: String,
    pub credits: u32,
    pub available_spots: u32,
    pub total_spots: u32,
    pub instructor: String,
    pub schedule: String,
    pub prerequisites: String,
    pub status: CourseStatus,
    pub observed_at: DateTime<Utc>,
}

impl CourseSnapshot {
    pub fn has_open_seats(&self) -> bool {
        self.available_spots > 0
    }

    /// Builds a snapshot from a raw scraped row, stamping it with `observed_at`.
    pub fn from_listing(listing: CourseListing, observed_at: DateTime<Utc>) -> Self {
        let (available_spots, total_spots) = parse_availability(&listing.availability);
        let credits = listing.credits.trim().parse::<u32>().unwrap_or(0);

        Self {
            code: listing.code.trim().to_ascii_uppercase(),
            name: listing.name,
            credits,
            available_spots,
            total_spots,
            instructor: listing.instructor,
            schedule: listing.schedule,
            prerequisites: listing.prerequisites,
            status: CourseStatus::from_scraped(&listing.status),
            observed_at,
        }
    }
}

/// One course row as scraped by the portal, before normalisation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseListing {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub credits: String,
    /// Raw `available/total` text.
    pub availability: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default)]
    pub schedule: String,
    #[serde(default)]
    pub prerequisites: String,
    #[serde(default)]
    pub status: String,
}
