//! Payload normalization
//!
//! Converts a raw W-phase result into a [`NormalizedSolution`]. Required
//! fields that are missing or uncoercible abort normalization and nothing is
//! returned; optional fields are carried as `Field<T>` so absence and
//! invalidity reach the graph builder intact.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::{CoercionError, NormalizationError, NormalizationResult};
use crate::models::{NormalizedSolution, TensorComponents};

use super::payload::{
    coerce_f64, coerce_i64, coerce_string, coerce_timestamp, FieldSpec, RawResult, Section,
    CENTROID_MARKER, SOLUTION_SECTION,
};

// Nodal planes and magnitude: required
const STRIKE1: FieldSpec<f64> = FieldSpec::required("strike1", "str1", coerce_f64);
const DIP1: FieldSpec<f64> = FieldSpec::required("dip1", "dip1", coerce_f64);
const RAKE1: FieldSpec<f64> = FieldSpec::required("rake1", "rake1", coerce_f64);
const STRIKE2: FieldSpec<f64> = FieldSpec::required("strike2", "str2", coerce_f64);
const DIP2: FieldSpec<f64> = FieldSpec::required("dip2", "dip2", coerce_f64);
const RAKE2: FieldSpec<f64> = FieldSpec::required("rake2", "rake2", coerce_f64);
const MAGNITUDE: FieldSpec<f64> = FieldSpec::required("magnitude", "drmag", coerce_f64);

// Centroid location and magnitude type: optional
const CENTROID_LAT: FieldSpec<f64> = FieldSpec::optional("centroidLat", "drlat", coerce_f64);
const CENTROID_LON: FieldSpec<f64> = FieldSpec::optional("centroidLon", "drlon", coerce_f64);
const CENTROID_DEPTH: FieldSpec<f64> =
    FieldSpec::optional("centroidDepth", "drdepth", coerce_f64);
const MAGNITUDE_TYPE: FieldSpec<String> =
    FieldSpec::optional("magnitudeType", "drmagt", coerce_string);
const AUTHOR: FieldSpec<String> = FieldSpec::optional("author", "auth", coerce_string);

// Tensor components: each independently optional
const MRR: FieldSpec<f64> = FieldSpec::optional("mrr", "tmrr", coerce_f64);
const MTT: FieldSpec<f64> = FieldSpec::optional("mtt", "tmtt", coerce_f64);
const MPP: FieldSpec<f64> = FieldSpec::optional("mpp", "tmpp", coerce_f64);
const MRT: FieldSpec<f64> = FieldSpec::optional("mrt", "tmrt", coerce_f64);
const MRP: FieldSpec<f64> = FieldSpec::optional("mrp", "tmrp", coerce_f64);
const MTP: FieldSpec<f64> = FieldSpec::optional("mtp", "tmtp", coerce_f64);

// Quality and event sections
const USED_PHASE_COUNT: FieldSpec<i64> =
    FieldSpec::optional("usedPhaseCount", "number_of_channels", coerce_i64)
        .in_section(Section::Quality);
const USED_STATION_COUNT: FieldSpec<i64> =
    FieldSpec::optional("usedStationCount", "number_of_stations", coerce_i64)
        .in_section(Section::Quality);
const AZIMUTHAL_GAP: FieldSpec<f64> =
    FieldSpec::optional("azimuthalGap", "azimuthal_gap", coerce_f64).in_section(Section::Quality);
const ORIGIN_TIME: FieldSpec<DateTime<Utc>> =
    FieldSpec::optional("originTime", "time", coerce_timestamp).in_section(Section::Event);

// Misfit, in preference order; the payload value is a percentage
const MISFIT_PREFERRED: FieldSpec<f64> = FieldSpec::optional("overallMisfit", "misfit", coerce_f64);
const MISFIT_FALLBACK: FieldSpec<f64> =
    FieldSpec::optional("overallMisfit", "misfit", coerce_f64).in_section(Section::Quality);

/// Converts raw result payloads into normalized solutions
pub struct PayloadNormalizer;

impl PayloadNormalizer {
    /// Normalize a raw result
    ///
    /// Fails with `NormalizationError::Schema` when the solution section is
    /// absent, and with the first failing required field otherwise.
    pub fn normalize(raw: &RawResult) -> NormalizationResult<NormalizedSolution> {
        if raw.section(Section::Solution).is_none() {
            return Err(NormalizationError::Schema {
                section: SOLUTION_SECTION.to_string(),
            });
        }

        let solution = NormalizedSolution {
            strike1: STRIKE1.require(raw)?,
            dip1: DIP1.require(raw)?,
            rake1: RAKE1.require(raw)?,
            strike2: STRIKE2.require(raw)?,
            dip2: DIP2.require(raw)?,
            rake2: RAKE2.require(raw)?,
            magnitude: MAGNITUDE.require(raw)?,

            centroid_lat: CENTROID_LAT.read_optional(raw),
            centroid_lon: CENTROID_LON.read_optional(raw),
            centroid_depth: CENTROID_DEPTH.read_optional(raw),
            magnitude_type: MAGNITUDE_TYPE.read_optional(raw),
            author: Self::author(raw),

            tensor: TensorComponents {
                mrr: MRR.read_optional(raw),
                mtt: MTT.read_optional(raw),
                mpp: MPP.read_optional(raw),
                mrt: MRT.read_optional(raw),
                mrp: MRP.read_optional(raw),
                mtp: MTP.read_optional(raw),
            },

            used_phase_count: USED_PHASE_COUNT.read_optional(raw),
            used_station_count: USED_STATION_COUNT.read_optional(raw),
            azimuthal_gap: AZIMUTHAL_GAP.read_optional(raw),
            origin_time: ORIGIN_TIME.read_optional(raw),
            is_centroid: raw.has_key(CENTROID_MARKER),
            overall_misfit: Self::overall_misfit(raw),
        };

        let invalid = solution.invalid_optional_fields();
        if !invalid.is_empty() {
            warn!(
                "Optional fields present but unusable, left unset: {}",
                invalid.join(", ")
            );
        }

        info!(
            "Payload normalized: magnitude={} centroid={} misfit={:?}",
            solution.magnitude, solution.is_centroid, solution.overall_misfit
        );

        Ok(solution)
    }

    /// Author, or an empty string when the payload names none
    fn author(raw: &RawResult) -> String {
        match AUTHOR.read_optional(raw) {
            Ok(author) => author,
            Err(CoercionError::Missing) => String::new(),
            Err(e) => {
                warn!("Ignoring unusable author: {}", e);
                String::new()
            }
        }
    }

    /// Misfit from the preferred key, else the fallback key, as a fraction
    ///
    /// Absence of both keys or a coercion failure leaves the misfit unset.
    fn overall_misfit(raw: &RawResult) -> Option<f64> {
        let spec = if raw.lookup(MISFIT_PREFERRED.section, MISFIT_PREFERRED.key).is_some() {
            MISFIT_PREFERRED
        } else if raw.lookup(MISFIT_FALLBACK.section, MISFIT_FALLBACK.key).is_some() {
            MISFIT_FALLBACK
        } else {
            debug!("No misfit in payload");
            return None;
        };

        match spec.read_optional(raw) {
            Ok(percent) => Some(percent / 100.0),
            Err(e) => {
                debug!(
                    "Misfit unusable in section {}: {}",
                    spec.section.key(),
                    e
                );
                None
            }
        }
    }
}
