//! Durable archive file
//!
//! Writes the origin (with its magnitude) and the focal mechanism (with its
//! moment tensor) as SeisComP XML. The document is written to a temporary
//! sibling, synced and renamed into place so readers never see a partial
//! file.

use quick_xml::escape::escape;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::errors::SinkResult;
use crate::models::{
    CreationInfo, DomainGraph, FocalMechanism, Magnitude, MomentTensor, NodalPlane, Origin,
    RealQuantity,
};
use crate::utils::datetime::DateTimeParser;

const SEISCOMP_NAMESPACE: &str = "http://geofon.gfz-potsdam.de/ns/seiscomp3-schema/0.12";
const SEISCOMP_VERSION: &str = "0.12";

/// Indented XML text builder
struct XmlDocument {
    out: String,
    depth: usize,
}

impl XmlDocument {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str, attributes: &[(&str, &str)]) {
        self.indent();
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attributes {
            self.out.push_str(&format!(" {}=\"{}\"", name, escape(*value)));
        }
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str(&format!("</{tag}>\n"));
    }

    fn leaf(&mut self, tag: &str, text: &str) {
        self.indent();
        self.out.push_str(&format!("<{tag}>{}</{tag}>\n", escape(text)));
    }

    fn quantity(&mut self, tag: &str, quantity: &RealQuantity) {
        self.open(tag, &[]);
        self.leaf("value", &quantity.value.to_string());
        if let Some(uncertainty) = quantity.uncertainty {
            self.leaf("uncertainty", &uncertainty.to_string());
        }
        self.close(tag);
    }

    fn optional_quantity(&mut self, tag: &str, quantity: Option<&RealQuantity>) {
        if let Some(quantity) = quantity {
            self.quantity(tag, quantity);
        }
    }

    fn optional_leaf<T: ToString>(&mut self, tag: &str, value: Option<T>) {
        if let Some(value) = value {
            self.leaf(tag, &value.to_string());
        }
    }

    fn creation_info(&mut self, info: &CreationInfo) {
        self.open("creationInfo", &[]);
        self.leaf("agencyID", &info.agency_id);
        if !info.author.is_empty() {
            self.leaf("author", &info.author);
        }
        self.leaf(
            "creationTime",
            &DateTimeParser::format_for_archive(&info.creation_time),
        );
        self.close("creationInfo");
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Render the archive document for a graph
pub fn render_archive(graph: &DomainGraph) -> String {
    let mut doc = XmlDocument::new();
    doc.open(
        "seiscomp",
        &[("xmlns", SEISCOMP_NAMESPACE), ("version", SEISCOMP_VERSION)],
    );
    doc.open("EventParameters", &[]);
    write_origin(&mut doc, &graph.origin);
    write_focal_mechanism(&mut doc, &graph.focal_mechanism);
    doc.close("EventParameters");
    doc.close("seiscomp");
    doc.finish()
}

fn write_origin(doc: &mut XmlDocument, origin: &Origin) {
    doc.open("origin", &[("publicID", origin.public_id.as_str())]);
    if let Some(time) = &origin.time {
        doc.open("time", &[]);
        doc.leaf("value", &DateTimeParser::format_for_archive(&time.value));
        doc.close("time");
    }
    doc.optional_quantity("latitude", origin.latitude.as_ref());
    doc.optional_quantity("longitude", origin.longitude.as_ref());
    doc.optional_quantity("depth", origin.depth.as_ref());
    doc.leaf("methodID", &origin.method_id);

    let quality = &origin.quality;
    if quality.used_phase_count.is_some() || quality.used_station_count.is_some() {
        doc.open("quality", &[]);
        doc.optional_leaf("usedPhaseCount", quality.used_phase_count);
        doc.optional_leaf("usedStationCount", quality.used_station_count);
        doc.close("quality");
    }

    doc.leaf("type", origin.origin_type.as_str());
    doc.leaf("evaluationMode", origin.evaluation_mode.as_str());
    doc.leaf("evaluationStatus", origin.evaluation_status.as_str());
    doc.creation_info(&origin.creation_info);
    if let Some(magnitude) = &origin.magnitude {
        write_magnitude(doc, magnitude);
    }
    doc.close("origin");
}

fn write_magnitude(doc: &mut XmlDocument, magnitude: &Magnitude) {
    doc.open("magnitude", &[("publicID", magnitude.public_id.as_str())]);
    doc.quantity("magnitude", &magnitude.magnitude);
    doc.leaf("type", &magnitude.magnitude_type);
    doc.leaf("originID", &magnitude.origin_id);
    doc.leaf("methodID", &magnitude.method_id);
    doc.optional_leaf("stationCount", magnitude.station_count);
    doc.creation_info(&magnitude.creation_info);
    doc.close("magnitude");
}

fn write_nodal_plane(doc: &mut XmlDocument, tag: &str, plane: &NodalPlane) {
    doc.open(tag, &[]);
    doc.quantity("strike", &plane.strike);
    doc.quantity("dip", &plane.dip);
    doc.quantity("rake", &plane.rake);
    doc.close(tag);
}

fn write_focal_mechanism(doc: &mut XmlDocument, fm: &FocalMechanism) {
    doc.open("focalMechanism", &[("publicID", fm.public_id.as_str())]);
    doc.leaf("triggeringOriginID", &fm.triggering_origin_id);
    doc.open("nodalPlanes", &[]);
    write_nodal_plane(doc, "nodalPlane1", &fm.nodal_planes.nodal_plane1);
    write_nodal_plane(doc, "nodalPlane2", &fm.nodal_planes.nodal_plane2);
    doc.close("nodalPlanes");
    doc.optional_leaf("azimuthalGap", fm.azimuthal_gap);
    doc.optional_leaf("stationPolarityCount", fm.station_polarity_count);
    doc.optional_leaf("misfit", fm.misfit);
    doc.leaf("methodID", &fm.method_id);
    doc.leaf("evaluationMode", fm.evaluation_mode.as_str());
    doc.creation_info(&fm.creation_info);
    if let Some(moment_tensor) = &fm.moment_tensor {
        write_moment_tensor(doc, moment_tensor);
    }
    doc.close("focalMechanism");
}

fn write_moment_tensor(doc: &mut XmlDocument, mt: &MomentTensor) {
    doc.open("momentTensor", &[("publicID", mt.public_id.as_str())]);
    doc.leaf("derivedOriginID", &mt.derived_origin_id);
    doc.optional_leaf("momentMagnitudeID", mt.moment_magnitude_id.as_deref());

    let components = mt.tensor.set_components();
    if !components.is_empty() {
        doc.open("tensor", &[]);
        for (name, value) in &components {
            doc.quantity(name, value);
        }
        doc.close("tensor");
    }

    doc.leaf("methodID", &mt.method_id);
    doc.creation_info(&mt.creation_info);
    doc.close("momentTensor");
}

/// Writes the archive file into the run's output directory
#[derive(Debug, Clone)]
pub struct ArchiveSink {
    output_dir: PathBuf,
    file_name: String,
}

impl ArchiveSink {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(output_dir: P, file_name: S) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(&self.file_name)
    }

    /// Write the archive and return its final path
    pub async fn write(&self, graph: &DomainGraph) -> SinkResult<PathBuf> {
        let document = render_archive(graph);
        let target = self.path();
        write_atomically(&target, document.as_bytes()).await?;

        info!(
            "Archive written: path={} bytes={}",
            target.display(),
            document.len()
        );
        Ok(target)
    }
}

/// Write `contents` to `target` via a synced temporary sibling and a rename
pub async fn write_atomically(target: &Path, contents: &[u8]) -> SinkResult<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_name = target.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&temp_path, target).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    debug!("Replaced {} atomically", target.display());
    Ok(())
}
