//! Normalized moment tensor solution
//!
//! Strict intermediate record produced by the payload normalizer. Required
//! fields are plain values; optional fields are `Field<T>`, which keeps the
//! difference between "absent", "invalid" and a real value (including zero).

use chrono::{DateTime, Utc};

use crate::errors::CoercionError;

/// Outcome of reading one optional payload field
///
/// `Err(CoercionError::Missing)` means the key was absent; any other error
/// means the value was present but unusable.
pub type Field<T> = Result<T, CoercionError>;

/// The six independent moment tensor components
#[derive(Debug, Clone, PartialEq)]
pub struct TensorComponents {
    pub mrr: Field<f64>,
    pub mtt: Field<f64>,
    pub mpp: Field<f64>,
    pub mrt: Field<f64>,
    pub mrp: Field<f64>,
    pub mtp: Field<f64>,
}

impl TensorComponents {
    /// All components absent
    pub fn absent() -> Self {
        Self {
            mrr: Err(CoercionError::Missing),
            mtt: Err(CoercionError::Missing),
            mpp: Err(CoercionError::Missing),
            mrt: Err(CoercionError::Missing),
            mrp: Err(CoercionError::Missing),
            mtp: Err(CoercionError::Missing),
        }
    }

    /// Components paired with their names, in archive order
    pub fn named(&self) -> [(&'static str, &Field<f64>); 6] {
        [
            ("mrr", &self.mrr),
            ("mtt", &self.mtt),
            ("mpp", &self.mpp),
            ("mrt", &self.mrt),
            ("mrp", &self.mrp),
            ("mtp", &self.mtp),
        ]
    }
}

/// Normalized moment tensor solution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSolution {
    pub strike1: f64,
    pub dip1: f64,
    pub rake1: f64,
    pub strike2: f64,
    pub dip2: f64,
    pub rake2: f64,

    pub centroid_lat: Field<f64>,
    pub centroid_lon: Field<f64>,
    pub centroid_depth: Field<f64>,

    pub magnitude: f64,
    pub magnitude_type: Field<String>,
    /// Empty when the payload names no author
    pub author: String,

    pub tensor: TensorComponents,

    pub used_phase_count: Field<i64>,
    pub used_station_count: Field<i64>,
    pub azimuthal_gap: Field<f64>,

    pub origin_time: Field<DateTime<Utc>>,
    /// True iff the payload carries a centroid section at all
    pub is_centroid: bool,
    /// Misfit as a fraction (payload percentage / 100)
    pub overall_misfit: Option<f64>,
}

impl NormalizedSolution {
    /// Names of optional fields that were present but unusable
    pub fn invalid_optional_fields(&self) -> Vec<&'static str> {
        let scalars: [(&'static str, bool); 9] = [
            ("centroidLat", is_invalid(&self.centroid_lat)),
            ("centroidLon", is_invalid(&self.centroid_lon)),
            ("centroidDepth", is_invalid(&self.centroid_depth)),
            ("magnitudeType", is_invalid(&self.magnitude_type)),
            ("usedPhaseCount", is_invalid(&self.used_phase_count)),
            ("usedStationCount", is_invalid(&self.used_station_count)),
            ("azimuthalGap", is_invalid(&self.azimuthal_gap)),
            ("originTime", is_invalid(&self.origin_time)),
            ("tensor", self.tensor.named().iter().any(|(_, f)| is_invalid(f))),
        ];
        scalars
            .into_iter()
            .filter_map(|(name, invalid)| invalid.then_some(name))
            .collect()
    }

    /// Canonical text of the solution's published content
    ///
    /// Equal for equal solutions; any change to a value that reaches the
    /// graph changes it. Unusable optional fields read as `-`.
    pub fn fingerprint(&self) -> String {
        let mut parts = vec![
            self.strike1.to_string(),
            self.dip1.to_string(),
            self.rake1.to_string(),
            self.strike2.to_string(),
            self.dip2.to_string(),
            self.rake2.to_string(),
            field_text(&self.centroid_lat),
            field_text(&self.centroid_lon),
            field_text(&self.centroid_depth),
            self.magnitude.to_string(),
            field_text(&self.magnitude_type),
            self.author.clone(),
        ];
        parts.extend(self.tensor.named().into_iter().map(|(_, f)| field_text(f)));
        parts.extend([
            field_text(&self.used_phase_count),
            field_text(&self.used_station_count),
            field_text(&self.azimuthal_gap),
            self.origin_time
                .as_ref()
                .map_or_else(|_| "-".to_string(), |t| t.to_rfc3339()),
            self.is_centroid.to_string(),
            self.overall_misfit.map_or_else(|| "-".to_string(), |m| m.to_string()),
        ]);
        parts.join("|")
    }
}

fn is_invalid<T>(field: &Field<T>) -> bool {
    matches!(field, Err(e) if *e != CoercionError::Missing)
}

fn field_text<T: ToString>(field: &Field<T>) -> String {
    field.as_ref().map_or_else(|_| "-".to_string(), ToString::to_string)
}
