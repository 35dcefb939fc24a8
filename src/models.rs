use serde::{Deserialize, Serialize};

use crate::ingestion::Row;

/// Source spreadsheet column names.
pub mod columns {
    pub const NAME: &str = "Espacio";
    pub const KIND: &str = "TIPO";
    pub const CITY: &str = "COMUNA";
    pub const ADDRESS: &str = "DIRECCIÓN";
    pub const INFO: &str = "MÁS INFO";
    pub const SCHEDULE_START: &str = "Horario de Inicio";
    pub const SCHEDULE_END: &str = "Horario de fin";
    pub const SCHEDULE_DAYS: &str = "Dias (ordenar columnas) (Semana del 19)";
    pub const CONTACT: &str = "CONTACTO";
}

const COORDINATE_SCALE: f64 = 1_000_000.0;
pub const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        (lat.is_finite() && lng.is_finite()).then_some(Self { lat, lng })
    }

    /// Rounds both components to six decimals, half away from zero.
    pub fn rounded(self) -> Self {
        Self {
            lat: round_component(self.lat),
            lng: round_component(self.lng),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }
}

fn round_component(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: String,
    pub end: String,
    pub days: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: String,
    pub address: String,
    pub place: String,
    pub status: String,
    pub capacity_status: String,
    pub supplies_needed: Vec<String>,
    pub info: String,
    pub schedule: Schedule,
    pub created_at: String,
    pub updated_at: String,
    pub contact: String,
    pub verified: bool,
    pub verificator: String,
}

impl EnrichedRecord {
    pub fn from_row(
        index: usize,
        row: &Row,
        coordinate: Option<Coordinate>,
        timestamp: &str,
    ) -> Self {
        let name = row.text(columns::NAME).to_string();
        let info = row.text(columns::INFO).to_string();
        Self {
            id: (index + 1).to_string(),
            place: name.clone(),
            name,
            kind: row.text(columns::KIND).to_lowercase(),
            lat: coordinate.map(|c| c.lat),
            lng: coordinate.map(|c| c.lng),
            city: row.text(columns::CITY).to_string(),
            address: row.text(columns::ADDRESS).to_string(),
            status: DEFAULT_STATUS.to_string(),
            capacity_status: String::new(),
            supplies_needed: split_supplies(&info),
            info,
            schedule: Schedule {
                start: row.text(columns::SCHEDULE_START).to_string(),
                end: row.text(columns::SCHEDULE_END).to_string(),
                days: row.text(columns::SCHEDULE_DAYS).to_string(),
            },
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
            contact: row.text(columns::CONTACT).to_string(),
            verified: false,
            verificator: String::new(),
        }
    }

    pub fn coordinate(&self) -> Option<Coordinate> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
            _ => None,
        }
    }
}

fn split_supplies(info: &str) -> Vec<String> {
    info.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
