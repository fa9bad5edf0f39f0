use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SeatStatus::Available),
            "HELD" => Ok(SeatStatus::Held),
            "BOOKED" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatClass {
    Standard,
    Premium,
}

impl SeatClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatClass::Standard => "STANDARD",
            SeatClass::Premium => "PREMIUM",
        }
    }
}

impl FromStr for SeatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STANDARD" => Ok(SeatClass::Standard),
            "PREMIUM" => Ok(SeatClass::Premium),
            other => Err(format!("unknown seat class: {}", other)),
        }
    }
}

/// One seat on one schedule. The hold token and expiry are present only
/// while the seat is `HELD`; the token fences a lapsed holder from touching
/// a seat that has since been reclaimed and handed to someone else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub number: String,
    pub class: SeatClass,
    pub fare_cents: i64,
    pub status: SeatStatus,
    pub hold_token: Option<Uuid>,
    pub hold_expires_at: Option<DateTime<Utc>>,
}

impl Seat {
    pub fn available(number: impl Into<String>, class: SeatClass, fare_cents: i64) -> Self {
        Self {
            number: number.into(),
            class,
            fare_cents,
            status: SeatStatus::Available,
            hold_token: None,
            hold_expires_at: None,
        }
    }

    /// True when the seat carries a hold whose expiry has passed.
    pub fn hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == SeatStatus::Held
            && self.hold_expires_at.map(|at| at <= now).unwrap_or(true)
    }
}
