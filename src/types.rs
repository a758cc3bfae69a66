use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Arcseconds per degree
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Sky position in degrees, with 1-sigma uncertainties (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra: f64,
    pub dec: f64,
    pub e_ra: f64,
    pub e_dec: f64,
}

impl SkyPosition {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec, e_ra: 0.0, e_dec: 0.0 }
    }

    /// Great-circle separation in degrees (haversine form, stable at small angles)
    pub fn separation_deg(&self, other: &SkyPosition) -> f64 {
        let dec1 = self.dec.to_radians();
        let dec2 = other.dec.to_radians();
        let half_ddec = (dec2 - dec1) / 2.0;
        let half_dra = (other.ra - self.ra).to_radians() / 2.0;

        let a = half_ddec.sin().powi(2) + dec1.cos() * dec2.cos() * half_dra.sin().powi(2);
        (2.0 * a.sqrt().min(1.0).asin()).to_degrees()
    }

    pub fn separation_arcsec(&self, other: &SkyPosition) -> f64 {
        self.separation_deg(other) * ARCSEC_PER_DEG
    }

    /// Offsets (Δα·cosδ, Δδ) in arcsec from this position to `other`
    pub fn offsets_arcsec(&self, other: &SkyPosition) -> (f64, f64) {
        let mut dra = other.ra - self.ra;
        if dra > 180.0 {
            dra -= 360.0;
        } else if dra < -180.0 {
            dra += 360.0;
        }
        let d_ra = dra * self.dec.to_radians().cos() * ARCSEC_PER_DEG;
        let d_dec = (other.dec - self.dec) * ARCSEC_PER_DEG;
        (d_ra, d_dec)
    }

    /// Position reached by moving `distance_deg` along `bearing_rad` (east of north)
    pub fn offset_by(&self, distance_deg: f64, bearing_rad: f64) -> SkyPosition {
        let dec1 = self.dec.to_radians();
        let rho = distance_deg.to_radians();
        let sin_dec2 = dec1.sin() * rho.cos() + dec1.cos() * rho.sin() * bearing_rad.cos();
        let dec2 = sin_dec2.clamp(-1.0, 1.0).asin();
        let dra = (bearing_rad.sin() * rho.sin() * dec1.cos())
            .atan2(rho.cos() - dec1.sin() * sin_dec2);
        SkyPosition::new(
            (self.ra + dra.to_degrees()).rem_euclid(360.0),
            dec2.to_degrees(),
        )
    }
}

/// A measured value with its 1-sigma uncertainty
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

impl Measurement {
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    /// value / error; a zero uncertainty gives an infinite significance instead of NaN
    pub fn significance(&self) -> f64 {
        if self.error > 0.0 {
            self.value / self.error
        } else if self.value == 0.0 {
            0.0
        } else {
            f64::INFINITY.copysign(self.value)
        }
    }
}

/// Gaussian shape: axes and position angle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Shape {
    pub major: f64,
    pub minor: f64,
    pub pa: f64,
    pub e_major: f64,
    pub e_minor: f64,
    pub e_pa: f64,
}

impl Shape {
    pub fn new(major: f64, minor: f64, pa: f64) -> Self {
        Self { major, minor, pa, ..Default::default() }
    }

    /// Both axes exactly zero: deconvolved to a point
    pub fn is_point(&self) -> bool {
        self.major == 0.0 && self.minor == 0.0
    }
}

/// Source classification as written by the source finder
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Fitted by a single Gaussian
    Single,
    /// Fitted by several Gaussians
    Multiple,
    /// Single Gaussian in an island shared with other sources
    Complex,
    Other(String),
}

impl SourceType {
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "S" => SourceType::Single,
            "M" => SourceType::Multiple,
            "C" => SourceType::Complex,
            other => SourceType::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            SourceType::Single => "S",
            SourceType::Multiple => "M",
            SourceType::Complex => "C",
            SourceType::Other(code) => code,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Which flux measurement a computation uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FluxKind {
    #[default]
    Total,
    Peak,
}

/// Restoring beam, degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub major: f64,
    pub minor: f64,
    pub pa: f64,
}

impl Beam {
    pub fn new(major: f64, minor: f64, pa: f64) -> Self {
        Self { major, minor, pa }
    }

    pub fn major_arcsec(&self) -> f64 {
        self.major * ARCSEC_PER_DEG
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if !(self.major.is_finite() && self.major > 0.0 && self.minor.is_finite() && self.minor > 0.0) {
            return Err(CatalogError::Schema(format!(
                "Beam axes must be positive, got {} x {} deg",
                self.major, self.minor
            )));
        }
        Ok(())
    }
}

/// One observation footprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointing {
    pub id: String,
    pub center: Option<SkyPosition>,
    /// Full field of view across the pointing, degrees
    pub fov_deg: Option<f64>,
}

impl Pointing {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), center: None, fov_deg: None }
    }

    /// Center and radius (degrees) when both are known
    pub fn footprint(&self) -> Option<(SkyPosition, f64)> {
        match (self.center, self.fov_deg) {
            (Some(center), Some(fov)) if fov > 0.0 => Some((center, fov / 2.0)),
            _ => None,
        }
    }
}

/// A detection removed during catalog combination in favour of another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardedDetection {
    pub pointing_id: String,
    pub original_id: u64,
    pub significance: f64,
}

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Id the record carried before global re-numbering
    pub original_id: Option<u64>,
    pub discarded: Vec<DiscardedDetection>,
}

/// Dynamically typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Float(f64),
    Int(i64),
    Text(String),
    Bool(bool),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            FieldValue::Text(_) => None,
        }
    }

    /// Parse text into the narrowest fitting value (int, float, bool, text)
    pub fn parse(text: &str) -> FieldValue {
        let text = text.trim();
        if let Ok(v) = text.parse::<i64>() {
            FieldValue::Int(v)
        } else if let Ok(v) = text.parse::<f64>() {
            FieldValue::Float(v)
        } else {
            match text.to_ascii_lowercase().as_str() {
                "true" => FieldValue::Bool(true),
                "false" => FieldValue::Bool(false),
                _ => FieldValue::Text(text.to_string()),
            }
        }
    }

    /// Parse text into the same kind of value as `template`, falling back to [`FieldValue::parse`]
    pub fn parse_like(text: &str, template: &FieldValue) -> FieldValue {
        let text = text.trim();
        let typed = match template {
            FieldValue::Float(_) => text.parse::<f64>().ok().map(FieldValue::Float),
            FieldValue::Int(_) => text.parse::<i64>().ok().map(FieldValue::Int),
            FieldValue::Bool(_) => match text.to_ascii_lowercase().as_str() {
                "1" | "true" => Some(FieldValue::Bool(true)),
                "0" | "false" => Some(FieldValue::Bool(false)),
                _ => None,
            },
            FieldValue::Text(_) => Some(FieldValue::Text(text.to_string())),
        };
        typed.unwrap_or_else(|| FieldValue::parse(text))
    }

    /// Key used for grouping identical values
    pub fn group_key(&self) -> String {
        match self {
            FieldValue::Float(v) => format!("f:{}", v.to_bits()),
            FieldValue::Int(v) => format!("f:{}", (*v as f64).to_bits()),
            FieldValue::Bool(v) => format!("b:{}", v),
            FieldValue::Text(v) => format!("t:{}", v),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", if *v { 1 } else { 0 }),
        }
    }
}

/// Canonical field names understood by [`SourceRecord::field`]
pub const CANONICAL_FIELDS: &[&str] = &[
    "id", "name", "pointing_id", "ra", "e_ra", "dec", "e_dec",
    "flux_total", "e_flux_total", "flux_peak", "e_flux_peak",
    "maj", "e_maj", "min", "e_min", "pa", "e_pa",
    "dc_maj", "e_dc_maj", "dc_min", "e_dc_min", "dc_pa", "e_dc_pa",
    "island_flux", "e_island_flux", "source_type", "quality_flag",
];

/// One detected source (or Gaussian component)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub id: u64,
    /// IAU-style name, survey prefixed when published
    pub name: Option<String>,
    pub position: SkyPosition,
    pub flux_total: Measurement,
    pub flux_peak: Measurement,
    pub shape_fit: Shape,
    pub shape_deconvolved: Shape,
    pub island_flux: Measurement,
    pub source_type: SourceType,
    /// `true` when the record takes part in matching and statistics
    pub quality_flag: bool,
    pub pointing_id: String,
    pub provenance: Provenance,
    /// Columns carried through without interpretation
    pub extra: BTreeMap<String, FieldValue>,
}

impl SourceRecord {
    /// Point source at the given position with zero flux; fill in the rest as needed
    pub fn new(id: u64, position: SkyPosition) -> Self {
        Self {
            id,
            name: None,
            position,
            flux_total: Measurement::default(),
            flux_peak: Measurement::default(),
            shape_fit: Shape::default(),
            shape_deconvolved: Shape::default(),
            island_flux: Measurement::default(),
            source_type: SourceType::Single,
            quality_flag: true,
            pointing_id: String::new(),
            provenance: Provenance::default(),
            extra: BTreeMap::new(),
        }
    }

    pub fn flux(&self, kind: FluxKind) -> Measurement {
        match kind {
            FluxKind::Total => self.flux_total,
            FluxKind::Peak => self.flux_peak,
        }
    }

    /// Fitted minus deconvolved major axis, with its combined uncertainty
    pub fn fit_excess(&self) -> (f64, f64) {
        let diff = self.shape_fit.major - self.shape_deconvolved.major;
        let sigma = self.shape_fit.e_major.hypot(self.shape_deconvolved.e_major);
        (diff, sigma)
    }

    /// |total − island| flux, with its combined uncertainty
    pub fn island_excess(&self) -> (f64, f64) {
        let diff = (self.flux_total.value - self.island_flux.value).abs();
        let sigma = self.flux_total.error.hypot(self.island_flux.error);
        (diff, sigma)
    }

    /// Read a field by canonical name, falling back to carried-through columns
    pub fn field(&self, name: &str) -> Option<FieldValue> {
        let float = |v: f64| Some(FieldValue::Float(v));
        match name {
            "id" => Some(FieldValue::Int(self.id as i64)),
            "name" => self.name.clone().map(FieldValue::Text),
            "pointing_id" => Some(FieldValue::Text(self.pointing_id.clone())),
            "ra" => float(self.position.ra),
            "e_ra" => float(self.position.e_ra),
            "dec" => float(self.position.dec),
            "e_dec" => float(self.position.e_dec),
            "flux_total" => float(self.flux_total.value),
            "e_flux_total" => float(self.flux_total.error),
            "flux_peak" => float(self.flux_peak.value),
            "e_flux_peak" => float(self.flux_peak.error),
            "maj" => float(self.shape_fit.major),
            "e_maj" => float(self.shape_fit.e_major),
            "min" => float(self.shape_fit.minor),
            "e_min" => float(self.shape_fit.e_minor),
            "pa" => float(self.shape_fit.pa),
            "e_pa" => float(self.shape_fit.e_pa),
            "dc_maj" => float(self.shape_deconvolved.major),
            "e_dc_maj" => float(self.shape_deconvolved.e_major),
            "dc_min" => float(self.shape_deconvolved.minor),
            "e_dc_min" => float(self.shape_deconvolved.e_minor),
            "dc_pa" => float(self.shape_deconvolved.pa),
            "e_dc_pa" => float(self.shape_deconvolved.e_pa),
            "island_flux" => float(self.island_flux.value),
            "e_island_flux" => float(self.island_flux.error),
            "source_type" => Some(FieldValue::Text(self.source_type.code().to_string())),
            "quality_flag" => Some(FieldValue::Int(if self.quality_flag { 1 } else { 0 })),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Maps canonical field names to table column names
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    columns: BTreeMap<String, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names written by the source finder
    pub fn internal() -> Self {
        let pairs = [
            ("id", "Source_id"),
            ("name", "Source_name"),
            ("pointing_id", "Pointing_id"),
            ("ra", "RA"),
            ("e_ra", "E_RA"),
            ("dec", "DEC"),
            ("e_dec", "E_DEC"),
            ("flux_total", "Total_flux"),
            ("e_flux_total", "E_Total_flux"),
            ("flux_peak", "Peak_flux"),
            ("e_flux_peak", "E_Peak_flux"),
            ("maj", "Maj"),
            ("e_maj", "E_Maj"),
            ("min", "Min"),
            ("e_min", "E_Min"),
            ("pa", "PA"),
            ("e_pa", "E_PA"),
            ("dc_maj", "DC_Maj"),
            ("e_dc_maj", "E_DC_Maj"),
            ("dc_min", "DC_Min"),
            ("e_dc_min", "E_DC_Min"),
            ("dc_pa", "DC_PA"),
            ("e_dc_pa", "E_DC_PA"),
            ("island_flux", "Isl_Total_flux"),
            ("e_island_flux", "E_Isl_Total_flux"),
            ("source_type", "S_Code"),
            ("quality_flag", "Quality_flag"),
        ];
        let mut mapping = Self::new();
        for (canonical, column) in pairs {
            mapping.insert(canonical, column);
        }
        mapping
    }

    pub fn insert(&mut self, canonical: &str, column: &str) -> &mut Self {
        self.columns.insert(canonical.to_string(), column.to_string());
        self
    }

    pub fn get(&self, canonical: &str) -> Option<&str> {
        self.columns.get(canonical).map(String::as_str)
    }

    /// Reverse lookup: which canonical field a table column feeds
    pub fn canonical_for(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(_, c)| c.as_str() == column)
            .map(|(canonical, _)| canonical.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Explicit description of a catalog that is not in the internal format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalCatalogSpec {
    pub columns: ColumnMapping,
    pub beam: Beam,
    /// Reference frequency in MHz
    pub freq_mhz: f64,
}

/// Explicit "no data" marker for a computation that had nothing to work on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("no data in {stage}: {reason}")]
pub struct EmptyResultWarning {
    pub stage: String,
    pub reason: String,
}

impl EmptyResultWarning {
    /// Build the warning and report it through the log
    pub fn emit(stage: &str, reason: impl Into<String>) -> Self {
        let warning = Self { stage: stage.to_string(), reason: reason.into() };
        log::warn!("{}", warning);
        warning
    }
}

/// A measured result, or an explicit marker that there was nothing to measure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Measured<T> {
    Value(T),
    NoData(EmptyResultWarning),
}

impl<T> Measured<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::NoData(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Measured::Value(v) => Some(v),
            Measured::NoData(_) => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Measured::NoData(_))
    }

    pub fn warning(&self) -> Option<&EmptyResultWarning> {
        match self {
            Measured::Value(_) => None,
            Measured::NoData(w) => Some(w),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Measured<U> {
        match self {
            Measured::Value(v) => Measured::Value(f(v)),
            Measured::NoData(w) => Measured::NoData(w),
        }
    }
}

/// Error types for catalog processing
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Tolerance error: {0}")]
    Tolerance(String),

    #[error("Id collision: global id {0} issued twice")]
    IdCollision(u64),

    #[error("Invalid selection rule: {0}")]
    InvalidRule(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Reject NaN, infinite and non-positive tolerances
pub fn check_tolerance(name: &str, value: f64) -> CatalogResult<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CatalogError::Tolerance(format!(
            "{} must be a positive finite number, got {}",
            name, value
        )));
    }
    Ok(value)
}
