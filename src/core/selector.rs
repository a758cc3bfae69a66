use crate::core::catalog::Catalog;
use crate::core::stats::SummaryStats;
use crate::types::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Comparison operator of a column predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Equal,
    Greater,
    Less,
}

impl Comparison {
    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::Greater => ">",
            Comparison::Less => "<",
        }
    }
}

/// One selection rule; each names the records it keeps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectionRule {
    /// Keep records of this source type, or with `negate` every other type
    SourceType { code: String, negate: bool },
    /// Keep point sources (deconvolved axes both zero), or drop them
    ZeroDeconvolution { keep_point_sources: bool },
    /// k > 0 keeps records whose fitted major axis exceeds the deconvolved one by
    /// more than k sigma; k < 0 keeps those within |k| sigma
    FitSignificance { k: f64 },
    /// k > 0 keeps records whose total and island fluxes differ by more than
    /// k sigma; k < 0 keeps those within |k| sigma
    FluxConsistency { k: f64 },
    /// Keep records sharing their value in `column` with another record, or
    /// with `keep_duplicates = false` only the records whose value is unique
    DuplicateIndex { column: String, keep_duplicates: bool },
    /// Ad hoc `column op value` test
    ColumnPredicate { column: String, op: Comparison, value: FieldValue },
}

impl SelectionRule {
    /// Source-type rule from a code, `!` prefix negates (`"!S"`)
    pub fn source_type(code: &str) -> CatalogResult<Self> {
        let code = code.trim();
        let (negate, code) = match code.strip_prefix('!') {
            Some(rest) => (true, rest.trim()),
            None => (false, code),
        };
        if code.is_empty() {
            return Err(CatalogError::InvalidRule("empty source type".to_string()));
        }
        Ok(SelectionRule::SourceType { code: code.to_string(), negate })
    }

    /// Parse a predicate such as `Total_flux > 0.01` or `S_Code = M`
    pub fn parse_predicate(text: &str) -> CatalogResult<Self> {
        let re = Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(=|>|<)\s*(.+?)\s*$")
            .map_err(|e| CatalogError::InvalidRule(e.to_string()))?;
        let caps = re
            .captures(text)
            .ok_or_else(|| CatalogError::InvalidRule(format!("cannot parse predicate '{}'", text)))?;

        let op = match &caps[2] {
            "=" => Comparison::Equal,
            ">" => Comparison::Greater,
            _ => Comparison::Less,
        };
        let value = FieldValue::parse(caps[3].trim_matches('\''));
        if op != Comparison::Equal && value.as_f64().is_none() {
            return Err(CatalogError::InvalidRule(format!(
                "'{}' needs a numeric threshold, got '{}'",
                op.symbol(),
                value
            )));
        }
        Ok(SelectionRule::ColumnPredicate { column: caps[1].to_string(), op, value })
    }

    /// Stable identifier used in summaries
    pub fn id(&self) -> String {
        match self {
            SelectionRule::SourceType { code, negate } => {
                format!("source_type{}{}", if *negate { "!=" } else { "=" }, code)
            }
            SelectionRule::ZeroDeconvolution { keep_point_sources } => {
                format!("zero_deconvolution({})", if *keep_point_sources { "keep" } else { "drop" })
            }
            SelectionRule::FitSignificance { k } => format!("fit_significance({})", k),
            SelectionRule::FluxConsistency { k } => format!("flux_consistency({})", k),
            SelectionRule::DuplicateIndex { column, keep_duplicates } => format!(
                "duplicate_index({}, {})",
                column,
                if *keep_duplicates { "duplicates" } else { "singletons" }
            ),
            SelectionRule::ColumnPredicate { column, op, value } => {
                format!("{}{}{}", column, op.symbol(), value)
            }
        }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        match self {
            SelectionRule::FitSignificance { k } | SelectionRule::FluxConsistency { k } => {
                if !k.is_finite() || *k == 0.0 {
                    return Err(CatalogError::Tolerance(format!(
                        "{}: k must be a non-zero finite number of sigma",
                        self.id()
                    )));
                }
            }
            SelectionRule::SourceType { code, .. } if code.trim().is_empty() => {
                return Err(CatalogError::InvalidRule("empty source type".to_string()));
            }
            SelectionRule::DuplicateIndex { column, .. } if column.trim().is_empty() => {
                return Err(CatalogError::InvalidRule("duplicate grouping needs a column".to_string()));
            }
            _ => {}
        }
        Ok(())
    }

    /// Keep mask over every record of the catalog, in record order
    pub fn keep_mask(&self, catalog: &Catalog) -> CatalogResult<Vec<bool>> {
        let records = catalog.records();
        let mask: Vec<bool> = match self {
            SelectionRule::SourceType { code, negate } => records
                .iter()
                .map(|r| (r.source_type.code() == code.as_str()) != *negate)
                .collect(),
            SelectionRule::ZeroDeconvolution { keep_point_sources } => records
                .iter()
                .map(|r| r.shape_deconvolved.is_point() == *keep_point_sources)
                .collect(),
            SelectionRule::FitSignificance { k } => records
                .iter()
                .map(|r| {
                    let (diff, sigma) = r.fit_excess();
                    exceeds(diff, sigma, *k)
                })
                .collect(),
            SelectionRule::FluxConsistency { k } => records
                .iter()
                .map(|r| {
                    let (diff, sigma) = r.island_excess();
                    exceeds(diff, sigma, *k)
                })
                .collect(),
            SelectionRule::DuplicateIndex { column, keep_duplicates } => {
                let keys: Vec<String> = catalog.column(column)?.iter().map(FieldValue::group_key).collect();
                let mut sizes: HashMap<&str, usize> = HashMap::new();
                for key in &keys {
                    *sizes.entry(key.as_str()).or_default() += 1;
                }
                keys.iter()
                    .map(|key| (sizes.get(key.as_str()).copied().unwrap_or(0) > 1) == *keep_duplicates)
                    .collect()
            }
            SelectionRule::ColumnPredicate { column, op, value } => catalog
                .column(column)?
                .iter()
                .map(|cell| compare(cell, *op, value, column))
                .collect::<CatalogResult<Vec<bool>>>()?,
        };
        Ok(mask)
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Signed-k sigma test, safe for zero uncertainty
fn exceeds(diff: f64, sigma: f64, k: f64) -> bool {
    let threshold = k.abs() * sigma;
    if k > 0.0 {
        diff > threshold
    } else {
        diff <= threshold
    }
}

fn compare(cell: &FieldValue, op: Comparison, value: &FieldValue, column: &str) -> CatalogResult<bool> {
    match op {
        Comparison::Equal => Ok(match (cell.as_f64(), value.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => cell.to_string() == value.to_string(),
        }),
        Comparison::Greater | Comparison::Less => {
            let (Some(a), Some(b)) = (cell.as_f64(), value.as_f64()) else {
                return Err(CatalogError::Schema(format!(
                    "Column '{}' value '{}' cannot be compared with '{}'",
                    column, cell, value
                )));
            };
            Ok(if op == Comparison::Greater { a > b } else { a < b })
        }
    }
}

/// Rule toggles as they arrive from an outer configuration layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Source type to keep; `!` prefix keeps every other type
    pub source_type: Option<String>,
    /// `Some(true)` keeps only point sources, `Some(false)` drops them
    pub zero_deconvolution: Option<bool>,
    pub fit_significance: Option<f64>,
    pub flux_consistency: Option<f64>,
    pub duplicate_column: Option<String>,
    /// Keep non-duplicates instead of duplicates
    pub invert_duplicates: bool,
    /// Predicates such as `"Peak_flux > 0.005"`
    pub predicates: Vec<String>,
}

impl SelectorConfig {
    pub fn rules(&self) -> CatalogResult<Vec<SelectionRule>> {
        let mut rules = Vec::new();
        if let Some(code) = &self.source_type {
            rules.push(SelectionRule::source_type(code)?);
        }
        if let Some(keep_point_sources) = self.zero_deconvolution {
            rules.push(SelectionRule::ZeroDeconvolution { keep_point_sources });
        }
        if let Some(k) = self.fit_significance {
            rules.push(SelectionRule::FitSignificance { k });
        }
        if let Some(k) = self.flux_consistency {
            rules.push(SelectionRule::FluxConsistency { k });
        }
        if let Some(column) = &self.duplicate_column {
            rules.push(SelectionRule::DuplicateIndex {
                column: column.clone(),
                keep_duplicates: !self.invert_duplicates,
            });
        }
        for predicate in &self.predicates {
            rules.push(SelectionRule::parse_predicate(predicate)?);
        }
        Ok(rules)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        for rule in self.rules()? {
            rule.validate()?;
        }
        Ok(())
    }
}

/// How much a summary reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    #[default]
    Basic,
    /// Adds per-rule counts and column statistics
    Full,
}

/// Numeric columns described in a full summary
const SUMMARY_COLUMNS: &[&str] = &["flux_total", "flux_peak", "maj", "min", "dc_maj", "dc_min", "island_flux"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCount {
    pub rule: String,
    /// Records the rule rejects on its own, flagged or not
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub total: usize,
    pub usable: usize,
    pub flagged: usize,
    pub per_rule: Vec<RuleCount>,
    /// Statistics over usable records, keyed by canonical column name
    pub columns: BTreeMap<String, Measured<SummaryStats>>,
}

impl fmt::Display for SelectionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} of {} records flagged, {} usable", self.flagged, self.total, self.usable)?;
        for count in &self.per_rule {
            writeln!(f, "  {:<40} rejects {}", count.rule, count.rejected)?;
        }
        for (column, stats) in &self.columns {
            match stats {
                Measured::Value(s) => writeln!(
                    f,
                    "  {:<12} n={} min={:.4e} median={:.4e} max={:.4e}",
                    column, s.count, s.min, s.median, s.max
                )?,
                Measured::NoData(w) => writeln!(f, "  {:<12} {}", column, w)?,
            }
        }
        Ok(())
    }
}

/// Stack of rules applied as a conjunction
#[derive(Debug, Clone, Default)]
pub struct Selector {
    rules: Vec<SelectionRule>,
}

impl Selector {
    pub fn new(rules: Vec<SelectionRule>) -> CatalogResult<Self> {
        for rule in &rules {
            rule.validate()?;
        }
        Ok(Self { rules })
    }

    pub fn from_config(config: &SelectorConfig) -> CatalogResult<Self> {
        Self::new(config.rules()?)
    }

    pub fn rules(&self) -> &[SelectionRule] {
        &self.rules
    }

    /// Whether each record passes every rule, ignoring current flags
    pub fn evaluate(&self, catalog: &Catalog) -> CatalogResult<Vec<bool>> {
        let mut keep = vec![true; catalog.len()];
        for rule in &self.rules {
            let mask = rule.keep_mask(catalog)?;
            for (k, m) in keep.iter_mut().zip(mask) {
                *k &= m;
            }
        }
        Ok(keep)
    }

    /// Clear the quality flag of every record a rule rejects
    pub fn apply(&self, catalog: &mut Catalog) -> CatalogResult<SelectionSummary> {
        let keep = self.evaluate(catalog)?;
        let flags: Vec<bool> = catalog.quality_flags().iter().zip(&keep).map(|(f, k)| *f && *k).collect();
        catalog.set_quality_flags(&flags)?;

        let summary = self.summarize(catalog, Verbosity::Basic)?;
        log::info!(
            "Selection on '{}' with {} rules: {} of {} records usable",
            catalog.name,
            self.rules.len(),
            summary.usable,
            summary.total
        );
        if summary.usable == 0 && summary.total > 0 {
            EmptyResultWarning::emit("selection", format!("no usable records left in '{}'", catalog.name));
        }
        Ok(summary)
    }

    pub fn summarize(&self, catalog: &Catalog, verbosity: Verbosity) -> CatalogResult<SelectionSummary> {
        let mut summary = basic_summary(catalog);
        if verbosity == Verbosity::Full {
            for rule in &self.rules {
                let rejected = rule.keep_mask(catalog)?.iter().filter(|k| !**k).count();
                summary.per_rule.push(RuleCount { rule: rule.id(), rejected });
            }
            summary.columns = column_statistics(catalog);
        }
        Ok(summary)
    }
}

/// Flag counts of a catalog, independent of any rule set
pub fn basic_summary(catalog: &Catalog) -> SelectionSummary {
    let total = catalog.len();
    let usable = catalog.usable_count();
    SelectionSummary {
        total,
        usable,
        flagged: total - usable,
        per_rule: Vec::new(),
        columns: BTreeMap::new(),
    }
}

fn column_statistics(catalog: &Catalog) -> BTreeMap<String, Measured<SummaryStats>> {
    SUMMARY_COLUMNS
        .iter()
        .map(|&column| {
            let values: Vec<f64> = catalog
                .usable()
                .filter_map(|r| r.field(column).and_then(|v| v.as_f64()))
                .collect();
            let stats = match SummaryStats::from_values(&values) {
                Some(stats) => Measured::Value(stats),
                None => Measured::NoData(EmptyResultWarning {
                    stage: "selection summary".to_string(),
                    reason: format!("no usable values in '{}'", column),
                }),
            };
            (column.to_string(), stats)
        })
        .collect()
}
