//! Domain graph construction
//!
//! [`ObjectGraphBuilder::build`] derives the origin, magnitude, focal
//! mechanism and moment tensor from one normalized solution and records the
//! change log the messaging consumer replays.
//!
//! # Ordering contract
//!
//! On success the returned change log holds exactly four entries, in this
//! order, all under the external event identity:
//!
//! 1. `Origin`
//! 2. `OriginReference`
//! 3. `FocalMechanism`
//! 4. `FocalMechanismReference`
//!
//! The magnitude and the moment tensor are attached to their parents only
//! after the tracker is sealed, so child attachment never appears in the
//! log and the consumer always sees parent references before children.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::{CoercionError, GraphBuildError};
use crate::models::{
    CreationInfo, DomainGraph, EvaluationMode, EvaluationStatus, Field, FocalMechanism,
    FocalMechanismReference, Magnitude, MomentTensor, NodalPlane, NodalPlanes,
    NormalizedSolution, Origin, OriginQuality, OriginReference, OriginType, RealQuantity,
    Tensor, TimeQuantity, METHOD_ID,
};
use crate::utils::datetime::DateTimeParser;
use crate::utils::deterministic_uuid::generate_public_id;

use super::change_log::{ChangeLog, ChangeObject, ChangeTracker};

/// Best-effort field application for one entity
///
/// Every skipped field is remembered; invalid values are reported in a
/// single WARN line when the entity is finished.
#[derive(Debug)]
pub struct FieldDiagnostics {
    entity: &'static str,
    skipped: Vec<(&'static str, CoercionError)>,
}

impl FieldDiagnostics {
    pub fn new(entity: &'static str) -> Self {
        Self {
            entity,
            skipped: Vec::new(),
        }
    }

    /// Value of `field`, or `None` with the failure recorded
    pub fn apply<T: Clone>(&mut self, name: &'static str, field: &Field<T>) -> Option<T> {
        match field {
            Ok(value) => Some(value.clone()),
            Err(e) => {
                self.skipped.push((name, e.clone()));
                None
            }
        }
    }

    /// Finite real value of `field`
    pub fn apply_real(&mut self, name: &'static str, field: &Field<f64>) -> Option<f64> {
        let value = self.apply(name, field)?;
        if value.is_finite() {
            Some(value)
        } else {
            self.skipped.push((
                name,
                CoercionError::Unparseable {
                    expected: "finite float",
                    value: value.to_string(),
                },
            ));
            None
        }
    }

    /// Non-negative count that fits the entity's count fields
    pub fn apply_count(&mut self, name: &'static str, field: &Field<i64>) -> Option<u32> {
        let value = self.apply(name, field)?;
        match u32::try_from(value) {
            Ok(count) => Some(count),
            Err(_) => {
                self.skipped.push((
                    name,
                    CoercionError::Unparseable {
                        expected: "count",
                        value: value.to_string(),
                    },
                ));
                None
            }
        }
    }

    /// Fields skipped because their value was unusable (absence excluded)
    pub fn invalid(&self) -> Vec<&'static str> {
        self.skipped
            .iter()
            .filter(|(_, e)| *e != CoercionError::Missing)
            .map(|(name, _)| *name)
            .collect()
    }

    /// All skipped fields, absent or invalid
    pub fn skipped(&self) -> Vec<&'static str> {
        self.skipped.iter().map(|(name, _)| *name).collect()
    }

    /// Log the aggregate and consume the diagnostics
    pub fn finish(self) {
        let details: Vec<String> = self
            .skipped
            .iter()
            .filter(|(_, e)| *e != CoercionError::Missing)
            .map(|(name, e)| format!("{name} ({e})"))
            .collect();

        if !details.is_empty() {
            warn!(
                "Best-effort fields skipped: entity={} fields=[{}]",
                self.entity,
                details.join(", ")
            );
        }

        let absent = self.skipped.len() - details.len();
        if absent > 0 {
            debug!("Absent fields left unset: entity={} count={}", self.entity, absent);
        }
    }
}

/// Identity every public id of one graph is derived from
struct EntityIds {
    agency: String,
    event_id: String,
    solution_key: String,
}

impl EntityIds {
    fn new(agency: &str, event_id: &str, solution: &NormalizedSolution) -> Self {
        Self {
            agency: agency.to_string(),
            event_id: event_id.to_string(),
            solution_key: solution.fingerprint(),
        }
    }

    fn public_id(&self, kind: &str) -> String {
        generate_public_id(&self.agency, &self.event_id, &self.solution_key, kind)
    }
}

/// Builds domain graphs for one agency
pub struct ObjectGraphBuilder;

impl ObjectGraphBuilder {
    /// Build the graph and its change log
    ///
    /// Fails only when the origin or the focal mechanism cannot be built;
    /// a magnitude that cannot be built is logged and omitted, and every
    /// optional field is applied independently.
    pub fn build(
        solution: &NormalizedSolution,
        event_id: &str,
        agency: &str,
    ) -> Result<(DomainGraph, ChangeLog), GraphBuildError> {
        if event_id.trim().is_empty() {
            return Err(GraphBuildError::entity("Origin", "event identity is empty"));
        }
        if agency.trim().is_empty() {
            return Err(GraphBuildError::entity("Origin", "agency code is empty"));
        }

        let creation_info = CreationInfo {
            agency_id: agency.to_string(),
            author: solution.author.clone(),
            creation_time: DateTimeParser::now_utc(),
        };

        let ids = EntityIds::new(agency, event_id, solution);
        let mut origin = Self::build_origin(solution, &ids, &creation_info);

        let magnitude = match Self::build_magnitude(solution, &ids, &creation_info, &origin) {
            Ok(magnitude) => Some(magnitude),
            Err(e) => {
                warn!("Magnitude omitted: event={} error={}", event_id, e);
                None
            }
        };

        let mut focal_mechanism =
            Self::build_focal_mechanism(solution, &ids, &creation_info, &origin)?;
        let moment_tensor = Self::build_moment_tensor(
            solution,
            &ids,
            &creation_info,
            &origin,
            magnitude.as_ref(),
        );

        let mut tracker = ChangeTracker::new(event_id);
        tracker.record(ChangeObject::Origin {
            public_id: origin.public_id.clone(),
        })?;
        tracker.record(ChangeObject::OriginReference(OriginReference {
            origin_id: origin.public_id.clone(),
        }))?;
        tracker.record(ChangeObject::FocalMechanism {
            public_id: focal_mechanism.public_id.clone(),
        })?;
        tracker.record(ChangeObject::FocalMechanismReference(
            FocalMechanismReference {
                focal_mechanism_id: focal_mechanism.public_id.clone(),
            },
        ))?;
        tracker.seal();

        origin.magnitude = magnitude;
        focal_mechanism.moment_tensor = Some(moment_tensor);

        info!(
            "Domain graph built: event={} origin={} focal_mechanism={} magnitude={}",
            event_id,
            origin.public_id,
            focal_mechanism.public_id,
            origin.magnitude.is_some()
        );

        Ok((
            DomainGraph {
                origin,
                focal_mechanism,
            },
            tracker.into_log(),
        ))
    }

    fn build_origin(
        solution: &NormalizedSolution,
        ids: &EntityIds,
        creation_info: &CreationInfo,
    ) -> Origin {
        let mut diagnostics = FieldDiagnostics::new("Origin");

        let time = diagnostics
            .apply("originTime", &solution.origin_time)
            .map(|value: DateTime<Utc>| TimeQuantity {
                value,
                uncertainty: None,
            });
        let latitude = diagnostics
            .apply_real("latitude", &solution.centroid_lat)
            .map(RealQuantity::new);
        let longitude = diagnostics
            .apply_real("longitude", &solution.centroid_lon)
            .map(RealQuantity::new);
        let depth = diagnostics
            .apply_real("depth", &solution.centroid_depth)
            .map(RealQuantity::new);
        let quality = OriginQuality {
            used_phase_count: diagnostics
                .apply_count("usedPhaseCount", &solution.used_phase_count),
            used_station_count: diagnostics
                .apply_count("usedStationCount", &solution.used_station_count),
        };
        diagnostics.finish();

        Origin {
            public_id: ids.public_id("Origin"),
            creation_info: creation_info.clone(),
            time,
            latitude,
            longitude,
            depth,
            quality,
            origin_type: if solution.is_centroid {
                OriginType::Centroid
            } else {
                OriginType::Hypocenter
            },
            evaluation_mode: EvaluationMode::Automatic,
            evaluation_status: EvaluationStatus::Confirmed,
            method_id: METHOD_ID.to_string(),
            magnitude: None,
        }
    }

    fn build_magnitude(
        solution: &NormalizedSolution,
        ids: &EntityIds,
        creation_info: &CreationInfo,
        origin: &Origin,
    ) -> Result<Magnitude, GraphBuildError> {
        if !solution.magnitude.is_finite() {
            return Err(GraphBuildError::entity(
                "Magnitude",
                format!("value {} is not finite", solution.magnitude),
            ));
        }
        let magnitude_type = match &solution.magnitude_type {
            Ok(t) if !t.trim().is_empty() => t.clone(),
            Ok(_) => return Err(GraphBuildError::entity("Magnitude", "magnitude type is empty")),
            Err(e) => {
                return Err(GraphBuildError::entity(
                    "Magnitude",
                    format!("magnitude type unusable: {e}"),
                ))
            }
        };

        let mut diagnostics = FieldDiagnostics::new("Magnitude");
        let station_count =
            diagnostics.apply_count("stationCount", &solution.used_station_count);
        diagnostics.finish();

        Ok(Magnitude {
            public_id: ids.public_id("Magnitude"),
            creation_info: creation_info.clone(),
            magnitude: RealQuantity::new(solution.magnitude),
            magnitude_type,
            origin_id: origin.public_id.clone(),
            station_count,
            method_id: METHOD_ID.to_string(),
        })
    }

    fn build_focal_mechanism(
        solution: &NormalizedSolution,
        ids: &EntityIds,
        creation_info: &CreationInfo,
        origin: &Origin,
    ) -> Result<FocalMechanism, GraphBuildError> {
        let planes = [
            ("strike1", solution.strike1),
            ("dip1", solution.dip1),
            ("rake1", solution.rake1),
            ("strike2", solution.strike2),
            ("dip2", solution.dip2),
            ("rake2", solution.rake2),
        ];
        if let Some((name, value)) = planes.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GraphBuildError::entity(
                "FocalMechanism",
                format!("nodal plane value {name}={value} is not finite"),
            ));
        }

        let mut diagnostics = FieldDiagnostics::new("FocalMechanism");
        let azimuthal_gap = diagnostics.apply_real("azimuthalGap", &solution.azimuthal_gap);
        let station_polarity_count =
            diagnostics.apply_count("stationPolarityCount", &solution.used_station_count);
        diagnostics.finish();

        Ok(FocalMechanism {
            public_id: ids.public_id("FocalMechanism"),
            creation_info: creation_info.clone(),
            triggering_origin_id: origin.public_id.clone(),
            nodal_planes: NodalPlanes {
                nodal_plane1: NodalPlane::new(solution.strike1, solution.dip1, solution.rake1),
                nodal_plane2: NodalPlane::new(solution.strike2, solution.dip2, solution.rake2),
            },
            method_id: METHOD_ID.to_string(),
            evaluation_mode: EvaluationMode::Automatic,
            misfit: solution.overall_misfit,
            station_polarity_count,
            azimuthal_gap,
            moment_tensor: None,
        })
    }

    fn build_moment_tensor(
        solution: &NormalizedSolution,
        ids: &EntityIds,
        creation_info: &CreationInfo,
        origin: &Origin,
        magnitude: Option<&Magnitude>,
    ) -> MomentTensor {
        let mut diagnostics = FieldDiagnostics::new("MomentTensor");
        let mut tensor = Tensor::default();
        for (name, field) in solution.tensor.named() {
            let value = diagnostics.apply_real(name, field).map(RealQuantity::new);
            if let Some(slot) = tensor.component_mut(name) {
                *slot = value;
            }
        }
        diagnostics.finish();

        MomentTensor {
            public_id: ids.public_id("MomentTensor"),
            creation_info: creation_info.clone(),
            derived_origin_id: origin.public_id.clone(),
            moment_magnitude_id: magnitude.map(|m| m.public_id.clone()),
            tensor,
            method_id: METHOD_ID.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TensorComponents;
    use rstest::rstest;
    use tracing_test::traced_test;

    fn solution() -> NormalizedSolution {
        NormalizedSolution {
            strike1: 0.0,
            dip1: 10.0,
            rake1: 90.0,
            strike2: 180.0,
            dip2: 80.0,
            rake2: 90.0,
            centroid_lat: Ok(-10.0),
            centroid_lon: Ok(120.0),
            centroid_depth: Ok(15.0),
            magnitude: 7.1,
            magnitude_type: Ok("Mww".to_string()),
            author: String::new(),
            tensor: TensorComponents {
                mrr: Ok(1.0),
                mtt: Ok(2.0),
                mpp: Ok(3.0),
                mrt: Ok(4.0),
                mrp: Ok(5.0),
                mtp: Ok(6.0),
            },
            used_phase_count: Ok(120),
            used_station_count: Ok(40),
            azimuthal_gap: Ok(35.0),
            origin_time: Err(CoercionError::Missing),
            is_centroid: false,
            overall_misfit: Some(0.25),
        }
    }

    #[test]
    fn test_change_log_order() {
        let (graph, log) = ObjectGraphBuilder::build(&solution(), "ga2020abcd", "GA").unwrap();

        assert_eq!(
            log.kinds(),
            vec![
                "Origin",
                "OriginReference",
                "FocalMechanism",
                "FocalMechanismReference"
            ]
        );
        assert!(log.entries().iter().all(|e| e.parent_id == "ga2020abcd"));
        assert_eq!(
            log.entries()[0].object,
            ChangeObject::Origin {
                public_id: graph.origin.public_id.clone()
            }
        );
        assert_eq!(
            log.entries()[3].object,
            ChangeObject::FocalMechanismReference(FocalMechanismReference {
                focal_mechanism_id: graph.focal_mechanism.public_id.clone()
            })
        );
    }

    #[test]
    fn test_children_attached_after_wiring() {
        let (graph, _) = ObjectGraphBuilder::build(&solution(), "ga2020abcd", "GA").unwrap();

        let magnitude = graph.magnitude().unwrap();
        let moment_tensor = graph.moment_tensor().unwrap();
        assert_eq!(magnitude.origin_id, graph.origin.public_id);
        assert_eq!(magnitude.magnitude_type, "Mww");
        assert_eq!(magnitude.station_count, Some(40));
        assert_eq!(moment_tensor.derived_origin_id, graph.origin.public_id);
        assert_eq!(
            moment_tensor.moment_magnitude_id.as_deref(),
            Some(magnitude.public_id.as_str())
        );
        assert_eq!(graph.focal_mechanism.triggering_origin_id, graph.origin.public_id);
    }

    #[test]
    fn test_origin_and_focal_mechanism_fields() {
        let (graph, _) = ObjectGraphBuilder::build(&solution(), "ga2020abcd", "GA").unwrap();

        let origin = &graph.origin;
        assert_eq!(origin.origin_type, OriginType::Hypocenter);
        assert_eq!(origin.evaluation_mode, EvaluationMode::Automatic);
        assert_eq!(origin.evaluation_status, EvaluationStatus::Confirmed);
        assert_eq!(origin.latitude, Some(RealQuantity::new(-10.0)));
        assert_eq!(origin.depth.unwrap().uncertainty, None);
        assert_eq!(origin.quality.used_phase_count, Some(120));
        assert_eq!(origin.time, None);
        assert!(origin.public_id.starts_with("smi:ga/Origin/"));

        let fm = &graph.focal_mechanism;
        assert_eq!(fm.nodal_planes.nodal_plane1, NodalPlane::new(0.0, 10.0, 90.0));
        assert_eq!(fm.nodal_planes.nodal_plane2, NodalPlane::new(180.0, 80.0, 90.0));
        assert_eq!(fm.misfit, Some(0.25));
        assert_eq!(fm.azimuthal_gap, Some(35.0));
        assert_eq!(fm.station_polarity_count, Some(40));
        assert_eq!(fm.method_id, METHOD_ID);
    }

    #[test]
    fn test_centroid_origin_type() {
        let mut centroid = solution();
        centroid.is_centroid = true;
        let (graph, _) = ObjectGraphBuilder::build(&centroid, "ga2020abcd", "GA").unwrap();
        assert_eq!(graph.origin.origin_type, OriginType::Centroid);
    }

    #[rstest]
    #[case("mrr")]
    #[case("mtt")]
    #[case("mpp")]
    #[case("mrt")]
    #[case("mrp")]
    #[case("mtp")]
    fn test_single_absent_component(#[case] absent: &str) {
        let mut sol = solution();
        match absent {
            "mrr" => sol.tensor.mrr = Err(CoercionError::Missing),
            "mtt" => sol.tensor.mtt = Err(CoercionError::Missing),
            "mpp" => sol.tensor.mpp = Err(CoercionError::Missing),
            "mrt" => sol.tensor.mrt = Err(CoercionError::Missing),
            "mrp" => sol.tensor.mrp = Err(CoercionError::Missing),
            _ => sol.tensor.mtp = Err(CoercionError::Missing),
        }

        let (graph, _) = ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap();
        let mut tensor = graph.moment_tensor().unwrap().tensor;

        let set: Vec<&str> = tensor.set_components().iter().map(|(n, _)| *n).collect();
        assert_eq!(set.len(), 5);
        assert!(!set.iter().any(|n| n.eq_ignore_ascii_case(absent)));
        assert_eq!(*tensor.component_mut(absent).unwrap(), None);
    }

    #[test]
    #[traced_test]
    fn test_invalid_fields_do_not_block_entity() {
        let mut sol = solution();
        sol.tensor.mpp = Ok(f64::NAN);
        sol.used_phase_count = Ok(-3);
        sol.azimuthal_gap = Err(CoercionError::WrongType {
            expected: "float",
            found: "bool".to_string(),
        });

        let (graph, _) = ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap();

        let tensor = graph.moment_tensor().unwrap().tensor;
        assert_eq!(tensor.mpp, None);
        assert_eq!(tensor.mrr, Some(RealQuantity::new(1.0)));
        assert_eq!(graph.origin.quality.used_phase_count, None);
        assert_eq!(graph.origin.quality.used_station_count, Some(40));
        assert_eq!(graph.focal_mechanism.azimuthal_gap, None);

        assert!(logs_contain("entity=MomentTensor fields=[mpp"));
        assert!(logs_contain("entity=Origin fields=[usedPhaseCount"));
        assert!(logs_contain("entity=FocalMechanism fields=[azimuthalGap"));
    }

    #[test]
    fn test_missing_magnitude_type_omits_magnitude() {
        let mut sol = solution();
        sol.magnitude_type = Err(CoercionError::Missing);

        let (graph, log) = ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap();
        assert!(graph.magnitude().is_none());
        assert_eq!(graph.moment_tensor().unwrap().moment_magnitude_id, None);
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_non_finite_nodal_plane_fails_build() {
        let mut sol = solution();
        sol.rake2 = f64::INFINITY;

        let err = ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap_err();
        assert!(matches!(
            err,
            GraphBuildError::Entity {
                entity: "FocalMechanism",
                ..
            }
        ));
    }

    #[test]
    fn test_empty_event_identity_fails_build() {
        assert!(ObjectGraphBuilder::build(&solution(), " ", "GA").is_err());
        assert!(ObjectGraphBuilder::build(&solution(), "ga2020abcd", "").is_err());
    }

    #[test]
    fn test_rebuild_is_equal_apart_from_creation_time() {
        let sol = solution();
        let (mut first, first_log) = ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap();
        let (mut second, second_log) =
            ObjectGraphBuilder::build(&sol, "ga2020abcd", "GA").unwrap();

        let stamp = DateTimeParser::now_utc();
        first.stamp_creation_time(stamp);
        second.stamp_creation_time(stamp);
        assert_eq!(first, second);
        assert_eq!(first_log, second_log);
    }

    fn public_ids(graph: &DomainGraph) -> Vec<String> {
        vec![
            graph.origin.public_id.clone(),
            graph.magnitude().unwrap().public_id.clone(),
            graph.focal_mechanism.public_id.clone(),
            graph.moment_tensor().unwrap().public_id.clone(),
        ]
    }

    #[test]
    fn test_same_result_keeps_public_ids() {
        let (first, _) = ObjectGraphBuilder::build(&solution(), "unassociated", "GA").unwrap();
        let (second, _) = ObjectGraphBuilder::build(&solution(), "unassociated", "GA").unwrap();
        assert_eq!(public_ids(&first), public_ids(&second));
    }

    #[rstest]
    #[case::strike(|s: &mut NormalizedSolution| s.strike1 = 5.0)]
    #[case::magnitude(|s: &mut NormalizedSolution| s.magnitude = 7.3)]
    #[case::centroid(|s: &mut NormalizedSolution| s.centroid_lat = Ok(-11.0))]
    #[case::tensor(|s: &mut NormalizedSolution| s.tensor.mtp = Err(CoercionError::Missing))]
    fn test_different_result_gets_new_public_ids(#[case] change: fn(&mut NormalizedSolution)) {
        let mut other = solution();
        change(&mut other);

        let (first, _) = ObjectGraphBuilder::build(&solution(), "unassociated", "GA").unwrap();
        let (second, second_log) =
            ObjectGraphBuilder::build(&other, "unassociated", "GA").unwrap();

        for (a, b) in public_ids(&first).iter().zip(public_ids(&second).iter()) {
            assert_ne!(a, b);
        }
        assert_eq!(
            second_log.entries()[0].object,
            ChangeObject::Origin {
                public_id: second.origin.public_id.clone()
            }
        );
    }

    #[test]
    fn test_diagnostics_separate_absent_from_invalid() {
        let mut diagnostics = FieldDiagnostics::new("Origin");
        assert_eq!(diagnostics.apply("a", &Ok(1.0)), Some(1.0));
        assert_eq!(diagnostics.apply::<f64>("b", &Err(CoercionError::Missing)), None);
        assert_eq!(diagnostics.apply_count("c", &Ok(i64::MAX)), None);

        assert_eq!(diagnostics.skipped(), vec!["b", "c"]);
        assert_eq!(diagnostics.invalid(), vec!["c"]);
        diagnostics.finish();
    }
}
