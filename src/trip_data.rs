use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::gps_sample::{self, Point};
use crate::utils;

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// Spatial cell identifier exactly as found in the table.
    pub cell: String,
    /// Authoritative collection time, when the device reported one.
    pub timestamp_sec: Option<i64>,
}

impl Sample {
    pub fn position(&self) -> Result<Point, RouteError> {
        gps_sample::decode_cell(&self.cell)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub cycle_id: String,
    pub start_sec: Option<i64>,
    pub end_sec: Option<i64>,
    pub odo_start_km: Option<f64>,
    pub odo_end_km: Option<f64>,
    pub samples: Vec<Sample>,
}

impl Trip {
    /// Odometer delta, the ground truth for the matched distance. `None` when
    /// either reading is missing.
    pub fn odometer_km(&self) -> Option<f64> {
        Some(self.odo_end_km? - self.odo_start_km?)
    }

    // samples with a timestamp go first in time order, the rest keep their
    // position in the table
    fn sort_samples(&mut self) {
        self.samples
            .sort_by_key(|s| (s.timestamp_sec.is_none(), s.timestamp_sec));
    }
}

/// Trips that one vehicle made, in the order they were driven.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub vehicle_model: String,
    pub trip_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    #[serde(rename = "CYCLE_ID")]
    cycle_id: String,
    #[serde(rename = "geoindex_10")]
    cell: String,
    #[serde(rename = "HEAD_COLL_TIMS", default)]
    timestamp: Option<String>,
    #[serde(rename = "DATETIME_START", default)]
    start: Option<String>,
    #[serde(rename = "DATETIME_END", default)]
    end: Option<String>,
    #[serde(rename = "ODO_START", default)]
    odo_start: Option<String>,
    #[serde(rename = "ODO_END", default)]
    odo_end: Option<String>,
}

fn optional_timestamp(value: &Option<String>) -> Result<Option<i64>> {
    match value {
        Some(text) => utils::parse_timestamp(text),
        None => Ok(None),
    }
}

fn optional_f64(value: &Option<String>) -> Result<Option<f64>> {
    match value {
        Some(text) => utils::parse_optional_f64(text),
        None => Ok(None),
    }
}

/// Parses the per-sample table (CSV with a header row) into trips sorted by
/// cycle id.
pub fn load_samples_csv(data: &[u8]) -> Result<Vec<Trip>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    let mut trips: BTreeMap<String, Trip> = BTreeMap::new();
    for (row, record) in reader.deserialize::<SampleRecord>().enumerate() {
        let record = record.with_context(|| format!("bad sample row {}", row + 1))?;
        // an unparsable cell is kept as is; decoding reports it per trip
        let sample = Sample {
            cell: record.cell,
            timestamp_sec: optional_timestamp(&record.timestamp)
                .with_context(|| format!("row {}", row + 1))?,
        };
        let start_sec = optional_timestamp(&record.start)?;
        let end_sec = optional_timestamp(&record.end)?;
        let odo_start_km = optional_f64(&record.odo_start)?;
        let odo_end_km = optional_f64(&record.odo_end)?;
        let trip = trips
            .entry(record.cycle_id.clone())
            .or_insert_with(|| Trip {
                cycle_id: record.cycle_id,
                start_sec,
                end_sec,
                odo_start_km,
                odo_end_km,
                samples: Vec::new(),
            });
        // trip level columns repeat on every row; the first non-empty wins
        trip.start_sec = trip.start_sec.or(start_sec);
        trip.end_sec = trip.end_sec.or(end_sec);
        trip.odo_start_km = trip.odo_start_km.or(odo_start_km);
        trip.odo_end_km = trip.odo_end_km.or(odo_end_km);
        trip.samples.push(sample);
    }

    let mut trips: Vec<Trip> = trips.into_values().collect();
    for trip in trips.iter_mut() {
        trip.sort_samples();
    }
    Ok(trips)
}

pub fn load_sequences_json(data: &[u8]) -> Result<Vec<Sequence>> {
    let sequences: Vec<Sequence> = serde_json::from_slice(data)?;
    Ok(sequences)
}

/// Everything loaded at session start. Read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    trips: Vec<Trip>,
    index: HashMap<String, usize>,
    sequences: Vec<Sequence>,
}

impl Dataset {
    pub fn new(trips: Vec<Trip>, sequences: Vec<Sequence>) -> Result<Self> {
        let index: HashMap<String, usize> = trips
            .iter()
            .enumerate()
            .map(|(i, trip)| (trip.cycle_id.clone(), i))
            .collect();
        if index.len() != trips.len() {
            bail!("duplicated cycle id in trip list");
        }

        let mut owner: HashMap<&str, &str> = HashMap::new();
        for sequence in &sequences {
            for trip_id in &sequence.trip_ids {
                if let Some(other) = owner.insert(trip_id, &sequence.vehicle_model) {
                    bail!(
                        "trip {} belongs to both `{}` and `{}`",
                        trip_id,
                        other,
                        sequence.vehicle_model
                    );
                }
                if !index.contains_key(trip_id) {
                    warn!(
                        "sequence `{}` refers to unknown trip {}",
                        sequence.vehicle_model, trip_id
                    );
                }
            }
        }

        Ok(Dataset {
            trips,
            index,
            sequences,
        })
    }

    pub fn trips(&self) -> &[Trip] {
        &self.trips
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn trip(&self, cycle_id: &str) -> Option<&Trip> {
        self.index.get(cycle_id).map(|i| &self.trips[*i])
    }

    pub fn cycle_ids(&self) -> impl Iterator<Item = &str> {
        self.trips.iter().map(|t| t.cycle_id.as_str())
    }

    pub fn sequence(&self, vehicle_model: &str) -> Option<&Sequence> {
        self.sequences
            .iter()
            .find(|s| s.vehicle_model == vehicle_model)
    }
}
