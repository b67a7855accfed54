//! Column transforms applied during the curated-stage pass.

use crate::config::EndpointConfig;
use crate::constants::{IMPORTED_AT_COLUMN, NO_TRANSFORM, TEL_SCHEME_PREFIX};
use crate::types::{Cell, RowSet};
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info};

/// Every transform that can be named in a field map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTransform {
    /// `phone_number`: remove the `tel:` scheme from telephone numbers.
    StripPhoneNumber,
}

impl ColumnTransform {
    pub const ALL: [ColumnTransform; 1] = [ColumnTransform::StripPhoneNumber];

    /// Look up a transform by the id used in field maps.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "phone_number" => Some(ColumnTransform::StripPhoneNumber),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            ColumnTransform::StripPhoneNumber => "phone_number",
        }
    }

    /// Apply to a whole column. A column that is entirely null is returned untouched.
    pub fn apply(&self, values: Vec<Cell>) -> Vec<Cell> {
        if values.iter().all(Option::is_none) {
            return values;
        }
        match self {
            ColumnTransform::StripPhoneNumber => values
                .into_iter()
                .map(|v| v.map(|s| s.replace(TEL_SCHEME_PREFIX, "")))
                .collect(),
        }
    }
}

/// Why a declared column transform was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkippedTransform {
    UnknownTransform { column: String, transform_id: String },
    MissingColumn { column: String, transform_id: String },
}

/// Outcome of one curated-stage pass over a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub applied: Vec<(String, String)>,
    pub skipped: Vec<SkippedTransform>,
}

/// Stamp `dl_imported_at` with `imported_at`, then apply the transforms declared in
/// the field maps of every output of `endpoint`.
///
/// Unknown transform ids and columns absent from `rows` are logged and skipped.
pub fn transform_rowset(
    endpoint: &EndpointConfig,
    rows: &mut RowSet,
    imported_at: DateTime<Utc>,
) -> TransformReport {
    let mut report = TransformReport::default();
    rows.set_constant_column(IMPORTED_AT_COLUMN, &imported_at.to_rfc3339());

    for (output, output_cfg) in &endpoint.output {
        for (column, transform_id) in &output_cfg.fields {
            if transform_id == NO_TRANSFORM {
                continue;
            }
            let Some(transform) = ColumnTransform::from_id(transform_id) else {
                info!("Transform '{}' for column '{}' ({}) is not registered, skipping", transform_id, column, output);
                counter!("etl_transform_skips_total", "reason" => "unknown_transform").increment(1);
                report.skipped.push(SkippedTransform::UnknownTransform {
                    column: column.clone(),
                    transform_id: transform_id.clone(),
                });
                continue;
            };

            if rows.map_column(column, |values| transform.apply(values)) {
                debug!("Applied '{}' to column '{}'", transform.id(), column);
                report.applied.push((column.clone(), transform_id.clone()));
            } else {
                info!("Column '{}' not in dataset, skipping transform '{}'", column, transform_id);
                counter!("etl_transform_skips_total", "reason" => "missing_column").increment(1);
                report.skipped.push(SkippedTransform::MissingColumn {
                    column: column.clone(),
                    transform_id: transform_id.clone(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputConfig;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn endpoint(fields: &[(&str, &str)]) -> EndpointConfig {
        let mut output = BTreeMap::new();
        output.insert(
            "contacts".to_string(),
            OutputConfig {
                fields: fields.iter().map(|(c, t)| (c.to_string(), t.to_string())).collect(),
                key: vec!["id".to_string()],
            },
        );
        EndpointConfig { schedule: None, params: Default::default(), output }
    }

    fn contacts() -> RowSet {
        RowSet::from_rows(
            vec!["id".to_string(), "phone_mobile".to_string(), "phone_work".to_string()],
            vec![
                vec![Some("1".into()), Some("tel:+31612345678".into()), None],
                vec![Some("2".into()), None, None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_strip_phone_number() {
        let out = ColumnTransform::StripPhoneNumber
            .apply(vec![Some("tel:+31612345678".to_string()), None, Some("+31201234567".to_string())]);
        assert_eq!(
            out,
            vec![Some("+31612345678".to_string()), None, Some("+31201234567".to_string())]
        );
    }

    #[test]
    fn test_all_null_column_passes_through() {
        let out = ColumnTransform::StripPhoneNumber.apply(vec![None, None]);
        assert_eq!(out, vec![None, None]);
    }

    #[test]
    fn test_registry_lookup() {
        for transform in ColumnTransform::ALL {
            assert_eq!(ColumnTransform::from_id(transform.id()), Some(transform));
        }
        assert_eq!(ColumnTransform::from_id("nothing"), None);
        assert_eq!(ColumnTransform::from_id("uppercase"), None);
    }

    #[test]
    fn test_transform_rowset_applies_and_stamps() {
        let cfg = endpoint(&[("phone_mobile", "phone_number"), ("phone_work", "phone_number"), ("id", "nothing")]);
        let mut rows = contacts();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let report = transform_rowset(&cfg, &mut rows, now);

        assert_eq!(rows.value(0, "phone_mobile"), Some(&Some("+31612345678".to_string())));
        assert_eq!(rows.value(1, "phone_work"), Some(&None));
        assert_eq!(rows.value(1, IMPORTED_AT_COLUMN), Some(&Some(now.to_rfc3339())));
        assert_eq!(report.applied.len(), 2);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_unknown_transform_and_missing_column_are_skipped() {
        let cfg = endpoint(&[("phone_mobile", "reverse"), ("fax", "phone_number")]);
        let mut rows = contacts();
        let before = rows.clone();

        let report = transform_rowset(&cfg, &mut rows, Utc::now());

        assert_eq!(report.skipped.len(), 2);
        assert!(report.applied.is_empty());
        assert_eq!(rows.column("phone_mobile"), before.column("phone_mobile"));
        assert!(rows.has_column(IMPORTED_AT_COLUMN));
    }
}
