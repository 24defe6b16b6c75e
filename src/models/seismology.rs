//! Seismological domain entities
//!
//! The subset of the SeisComP data model populated by the publisher: an
//! origin with its magnitude, a focal mechanism with its moment tensor, and
//! the event reference records that tie them to an externally owned event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Method tag stamped on every published entity
pub const METHOD_ID: &str = "wphase";

/// A real value with optional uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealQuantity {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
}

impl RealQuantity {
    /// Value-only quantity
    pub fn new(value: f64) -> Self {
        Self {
            value,
            uncertainty: None,
        }
    }
}

/// A point in time with optional uncertainty (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeQuantity {
    pub value: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationInfo {
    pub agency_id: String,
    pub author: String,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStatus {
    Preliminary,
    Confirmed,
    Reviewed,
    Final,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginType {
    Hypocenter,
    Centroid,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::Automatic => "automatic",
            EvaluationMode::Manual => "manual",
        }
    }
}

impl EvaluationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationStatus::Preliminary => "preliminary",
            EvaluationStatus::Confirmed => "confirmed",
            EvaluationStatus::Reviewed => "reviewed",
            EvaluationStatus::Final => "final",
            EvaluationStatus::Rejected => "rejected",
        }
    }
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginType::Hypocenter => "hypocenter",
            OriginType::Centroid => "centroid",
        }
    }
}

/// Origin quality sub-record; each count is independently set or absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginQuality {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_phase_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_station_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub public_id: String,
    pub creation_info: CreationInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<RealQuantity>,
    /// Kilometres below sea level
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<RealQuantity>,
    pub quality: OriginQuality,
    pub origin_type: OriginType,
    pub evaluation_mode: EvaluationMode,
    pub evaluation_status: EvaluationStatus,
    pub method_id: String,
    /// Owned child, attached only after reference wiring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<Magnitude>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Magnitude {
    pub public_id: String,
    pub creation_info: CreationInfo,
    pub magnitude: RealQuantity,
    #[serde(rename = "type")]
    pub magnitude_type: String,
    pub origin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_count: Option<u32>,
    pub method_id: String,
}

/// Strike, dip and rake of one fault plane (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodalPlane {
    pub strike: RealQuantity,
    pub dip: RealQuantity,
    pub rake: RealQuantity,
}

impl NodalPlane {
    pub fn new(strike: f64, dip: f64, rake: f64) -> Self {
        Self {
            strike: RealQuantity::new(strike),
            dip: RealQuantity::new(dip),
            rake: RealQuantity::new(rake),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodalPlanes {
    pub nodal_plane1: NodalPlane,
    pub nodal_plane2: NodalPlane,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocalMechanism {
    pub public_id: String,
    pub creation_info: CreationInfo,
    pub triggering_origin_id: String,
    pub nodal_planes: NodalPlanes,
    pub method_id: String,
    pub evaluation_mode: EvaluationMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misfit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_polarity_count: Option<u32>,
    /// Degrees
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuthal_gap: Option<f64>,
    /// Owned child, attached only after reference wiring
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moment_tensor: Option<MomentTensor>,
}

/// Tensor components (Nm); each is independently set or absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tensor {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrr: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtt: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpp: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrt: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mrp: Option<RealQuantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtp: Option<RealQuantity>,
}

impl Tensor {
    /// Mutable slot for a component by name
    pub fn component_mut(&mut self, name: &str) -> Option<&mut Option<RealQuantity>> {
        match name {
            "mrr" => Some(&mut self.mrr),
            "mtt" => Some(&mut self.mtt),
            "mpp" => Some(&mut self.mpp),
            "mrt" => Some(&mut self.mrt),
            "mrp" => Some(&mut self.mrp),
            "mtp" => Some(&mut self.mtp),
            _ => None,
        }
    }

    /// Components that are set, in archive order
    pub fn set_components(&self) -> Vec<(&'static str, RealQuantity)> {
        [
            ("Mrr", self.mrr),
            ("Mtt", self.mtt),
            ("Mpp", self.mpp),
            ("Mrt", self.mrt),
            ("Mrp", self.mrp),
            ("Mtp", self.mtp),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentTensor {
    pub public_id: String,
    pub creation_info: CreationInfo,
    pub derived_origin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moment_magnitude_id: Option<String>,
    pub tensor: Tensor,
    pub method_id: String,
}

/// Event-owned record pointing at an origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginReference {
    pub origin_id: String,
}

/// Event-owned record pointing at a focal mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocalMechanismReference {
    pub focal_mechanism_id: String,
}

/// The entities built from one solution
///
/// The magnitude lives inside the origin and the moment tensor inside the
/// focal mechanism once the builder has attached them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainGraph {
    pub origin: Origin,
    pub focal_mechanism: FocalMechanism,
}

impl DomainGraph {
    pub fn magnitude(&self) -> Option<&Magnitude> {
        self.origin.magnitude.as_ref()
    }

    pub fn moment_tensor(&self) -> Option<&MomentTensor> {
        self.focal_mechanism.moment_tensor.as_ref()
    }

    /// Overwrite every creation timestamp, e.g. to compare two builds
    pub fn stamp_creation_time(&mut self, creation_time: DateTime<Utc>) {
        self.origin.creation_info.creation_time = creation_time;
        if let Some(magnitude) = self.origin.magnitude.as_mut() {
            magnitude.creation_info.creation_time = creation_time;
        }
        self.focal_mechanism.creation_info.creation_time = creation_time;
        if let Some(moment_tensor) = self.focal_mechanism.moment_tensor.as_mut() {
            moment_tensor.creation_info.creation_time = creation_time;
        }
    }
}
