//! Declarative column mappings
//!
//! One `ColumnMapping` per source type describes how staged CSV columns
//! become detail-store columns: target name, required flag, semantic type,
//! cleaning rule and optional default. Columns with no detail target exist
//! only for deduplication (fallback keys).
//!
//! The mapping is static configuration; `validate()` turns an invalid
//! mapping into a load-time error instead of a runtime surprise.

use cdr_common::{CdrError, Result};

/// Technical columns the pipeline appends to every staged row. They are
/// always acceptable in a whitelist check, regardless of mode.
pub const TECHNICAL_COLUMNS: [&str; 3] = ["SOURCE_FILE", "SOURCE_DIR", "LOAD_TS"];

/// Semantic type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Free text, truncated to `max_length` when set.
    Text { max_length: Option<u32> },
    /// Numeric; values failing the numeric pattern become NULL.
    Number,
    /// Epoch count in the configured unit, converted to a calendar timestamp.
    Timestamp,
}

/// Cleaning transform applied before type coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanRule {
    None,
    Trim,
    /// Uppercase then trim.
    Upper,
    /// Strip CR, LF, TAB and space characters (MSISDN normalization).
    Msisdn,
}

/// Mapping rule for one input column.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    /// CSV header name (also the staging column name).
    pub source: &'static str,
    /// Detail-store column, or None for dedup-only columns.
    pub detail_column: Option<&'static str>,
    pub required: bool,
    pub kind: ColumnType,
    pub clean: CleanRule,
    /// Replacement for optional-but-empty values.
    pub default: Option<&'static str>,
}

/// Full mapping for one source type.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub columns: Vec<ColumnRule>,
    /// Ordered dedup key candidates; the first non-empty trimmed value wins.
    pub dedup_keys: Vec<&'static str>,
    /// Input column whose timestamp yields the derived START_HOUR, and whose
    /// raw value is preserved verbatim for traceability.
    pub start_time_column: &'static str,
}

impl ColumnMapping {
    /// Whether any column carries a detail target. An empty mapping means the
    /// source type cannot be transformed yet.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The acceptable input columns for the detail stage: exactly the mapped
    /// source names.
    pub fn whitelist(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.source).collect()
    }

    pub fn rule(&self, source: &str) -> Option<&ColumnRule> {
        self.columns.iter().find(|c| c.source == source)
    }

    /// Load-time validation of the mapping itself.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Ok(()); // unmapped source types are allowed to stage
        }
        for rule in &self.columns {
            if rule.default.is_some() && rule.required {
                return Err(CdrError::Config(format!(
                    "column {}: default only applies to optional columns",
                    rule.source
                )));
            }
            if rule.detail_column.is_none() && rule.required {
                return Err(CdrError::Config(format!(
                    "column {}: dedup-only columns must be optional",
                    rule.source
                )));
            }
        }
        for key in &self.dedup_keys {
            if self.rule(key).is_none() {
                return Err(CdrError::Config(format!(
                    "dedup key {} is not a mapped column",
                    key
                )));
            }
        }
        if self.dedup_keys.is_empty() {
            return Err(CdrError::Config("dedup key list is empty".to_string()));
        }
        if self.rule(self.start_time_column).is_none() {
            return Err(CdrError::Config(format!(
                "start time column {} is not a mapped column",
                self.start_time_column
            )));
        }
        Ok(())
    }
}

fn text(max_length: u32) -> ColumnType {
    ColumnType::Text {
        max_length: Some(max_length),
    }
}

/// Static mapping for the OCC source type.
pub fn occ_mapping() -> ColumnMapping {
    use CleanRule::{Msisdn, Trim, Upper};

    let required = |source, detail, kind, clean| ColumnRule {
        source,
        detail_column: Some(detail),
        required: true,
        kind,
        clean,
        default: None,
    };
    let opt_number = |source, detail| ColumnRule {
        source,
        detail_column: Some(detail),
        required: false,
        kind: ColumnType::Number,
        clean: CleanRule::None,
        default: None,
    };

    let columns = vec![
        required("DATASOURCE", "DATASOURCE", text(20), Trim),
        required("A_MSISDN", "A_MSISDN", text(200), Msisdn),
        ColumnRule {
            source: "B_MSISDN",
            detail_column: Some("B_MSISDN"),
            required: false,
            kind: text(200),
            clean: Msisdn,
            default: None,
        },
        required("ORIG_START_TIME", "START_DATE", ColumnType::Timestamp, Trim),
        required("APN", "APN", text(50), Trim),
        required("CALL_TYPE", "CALL_TYPE", text(20), Upper),
        required("EVENT_TYPE", "EVENT_TYPE", text(20), Upper),
        // Optional so the dedup fallbacks can take over when it is empty.
        ColumnRule {
            source: "CHARGING_ID",
            detail_column: Some("CHARGING_ID"),
            required: false,
            kind: text(40),
            clean: Trim,
            default: None,
        },
        required("SERVICE_ID", "SERVICE_ID", text(40), Trim),
        required("SUBSCRIBER_TYPE", "SUBSCRIBER_TYPE", text(30), Trim),
        required("ROAMING_TYPE", "ROAMING_TYPE", text(10), Trim),
        required("PARTNER", "PARTNER", text(20), Trim),
        required("FILTER_CODE", "FILTER_CODE", text(20), Trim),
        required("FLEX_FLD1", "FLEX_FLD1", text(100), Trim),
        required("FLEX_FLD2", "FLEX_FLD2", text(100), Trim),
        required("FLEX_FLD3", "FLEX_FLD3", text(100), Trim),
        opt_number("EVENT_COUNT", "EVENT_COUNT"),
        opt_number("DATA_VOLUME", "DATA_VOLUME"),
        opt_number("EVENT_DURATION", "EVENT_DURATION"),
        opt_number("CHARGE_AMOUNT", "CHARGE_AMOUNT"),
        opt_number("DA_AMOUNT_CALC", "DA_AMOUNT_CALC"),
        opt_number("MA_AMNT_CALC", "MA_AMNT_CALC"),
        ColumnRule {
            source: "KEYWORD",
            detail_column: Some("KEYWORD"),
            required: false,
            kind: text(100),
            clean: Trim,
            default: Some("_N"),
        },
        // Dedup fallbacks, never written to the detail store.
        ColumnRule {
            source: "CALL_REFERENCE",
            detail_column: None,
            required: false,
            kind: ColumnType::Text { max_length: None },
            clean: Trim,
            default: None,
        },
        ColumnRule {
            source: "RECORD_ID",
            detail_column: None,
            required: false,
            kind: ColumnType::Text { max_length: None },
            clean: Trim,
            default: None,
        },
    ];

    ColumnMapping {
        columns,
        dedup_keys: vec!["CHARGING_ID", "CALL_REFERENCE", "RECORD_ID"],
        start_time_column: "ORIG_START_TIME",
    }
}

/// Mapping for the MMG source type. The detail table layout is not final
/// yet, so MMG files stage but cannot be transformed.
pub fn mmg_mapping() -> ColumnMapping {
    ColumnMapping {
        columns: Vec::new(),
        dedup_keys: Vec::new(),
        start_time_column: "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occ_mapping_validates() {
        occ_mapping().validate().unwrap();
    }

    #[test]
    fn test_occ_required_columns() {
        let mapping = occ_mapping();
        for name in [
            "DATASOURCE",
            "A_MSISDN",
            "ORIG_START_TIME",
            "APN",
            "CALL_TYPE",
            "EVENT_TYPE",
        ] {
            let rule = mapping.rule(name).unwrap();
            assert!(rule.required, "{} should be required", name);
        }
        assert!(!mapping.rule("CHARGING_ID").unwrap().required);
        assert!(!mapping.rule("B_MSISDN").unwrap().required);
        assert!(!mapping.rule("KEYWORD").unwrap().required);
    }

    #[test]
    fn test_dedup_fallbacks_have_no_detail_target() {
        let mapping = occ_mapping();
        assert!(mapping.rule("CALL_REFERENCE").unwrap().detail_column.is_none());
        assert!(mapping.rule("RECORD_ID").unwrap().detail_column.is_none());
        assert_eq!(
            mapping.dedup_keys,
            vec!["CHARGING_ID", "CALL_REFERENCE", "RECORD_ID"]
        );
    }

    #[test]
    fn test_whitelist_is_mapped_sources() {
        let mapping = occ_mapping();
        let whitelist = mapping.whitelist();
        assert!(whitelist.contains(&"CHARGING_ID"));
        assert!(whitelist.contains(&"CALL_REFERENCE"));
        assert!(!whitelist.contains(&"SOURCE_FILE"));
    }

    #[test]
    fn test_required_default_rejected() {
        let mut mapping = occ_mapping();
        mapping.columns[0].default = Some("x");
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn test_unknown_dedup_key_rejected() {
        let mut mapping = occ_mapping();
        mapping.dedup_keys = vec!["NOT_A_COLUMN"];
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn test_mmg_mapping_is_empty() {
        assert!(mmg_mapping().is_empty());
    }
}
