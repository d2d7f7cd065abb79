use crate::table::Table;
use feedback_lens_common::{FeedbackLensError, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Summarize `primary_field` against each of `related_fields`, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ComparisonWire", rename_all = "camelCase")]
pub struct Comparison {
    pub primary_field: String,
    pub related_fields: Vec<String>,
}

// accepted request shapes: generalized, UI pair, UI axis
#[derive(Deserialize)]
#[serde(untagged)]
enum ComparisonWire {
    #[serde(rename_all = "camelCase")]
    Generalized {
        primary_field: String,
        related_fields: Vec<String>,
    },
    Pair {
        field1: String,
        field2: String,
    },
    #[serde(rename_all = "camelCase")]
    Axis {
        y_field: String,
        x_fields: Vec<String>,
    },
}

impl From<ComparisonWire> for Comparison {
    fn from(w: ComparisonWire) -> Self {
        match w {
            ComparisonWire::Generalized {
                primary_field,
                related_fields,
            } => Self {
                primary_field,
                related_fields,
            },
            ComparisonWire::Pair { field1, field2 } => Self {
                primary_field: field1,
                related_fields: vec![field2],
            },
            ComparisonWire::Axis { y_field, x_fields } => Self {
                primary_field: y_field,
                related_fields: x_fields,
            },
        }
    }
}

impl Comparison {
    pub fn new<I, S>(primary: &str, related: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            primary_field: primary.to_owned(),
            related_fields: related.into_iter().map(Into::into).collect(),
        }
    }

    /// Primary field followed by the related fields.
    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.primary_field.as_str())
            .chain(self.related_fields.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub year: String,
    pub facility: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reportType", rename_all = "lowercase")]
pub enum ReportConfig {
    Generalized { comparisons: Vec<Comparison> },
    Fieldwise { selection: FieldSelection },
}

impl ReportConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| FeedbackLensError::ConfigValidation(e.to_string()))
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Self::Generalized { .. } => "Generalized Report",
            Self::Fieldwise { .. } => "Field-Wise Report",
        }
    }

    /// Every field the config names, in first-reference order, without repeats.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let fields: IndexSet<&str> = match self {
            Self::Generalized { comparisons } => {
                comparisons.iter().flat_map(Comparison::fields).collect()
            }
            Self::Fieldwise { selection } => {
                [selection.year.as_str(), selection.facility.as_str()].into_iter().collect()
            }
        };
        fields.into_iter().collect()
    }

    /// Shape checks first, then every field against the table header.
    pub fn validate(&self, table: &Table) -> Result<()> {
        if let Self::Generalized { comparisons } = self {
            if comparisons.is_empty() {
                return Err(FeedbackLensError::ConfigValidation(
                    "at least one comparison is required".into(),
                ));
            }
            if let Some(c) = comparisons.iter().find(|c| c.related_fields.is_empty()) {
                return Err(FeedbackLensError::ConfigValidation(format!(
                    "comparison for '{}' has no related fields",
                    c.primary_field
                )));
            }
        }
        for field in self.referenced_fields() {
            if !table.has_field(field) {
                return Err(FeedbackLensError::FieldNotFound(field.to_owned()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Stakeholder,
    Subject,
}

impl FeedbackType {
    pub fn label(self) -> &'static str {
        match self {
            Self::Stakeholder => "Stakeholder Feedback",
            Self::Subject => "Subject Feedback",
        }
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = FeedbackLensError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "stakeholder" => Ok(Self::Stakeholder),
            "subject" => Ok(Self::Subject),
            other => Err(FeedbackLensError::ConfigValidation(format!(
                "unknown feedback type: {other}"
            ))),
        }
    }
}

/// Which ratings reports to produce: whole table, one per branch, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingsScope {
    Overall,
    Branch,
    Both,
}

impl std::str::FromStr for RatingsScope {
    type Err = FeedbackLensError;

    fn from_str(s: &str) -> Result<Self> {
        // "1" / "2" / "3" are the form values the upload page sends
        match s.to_lowercase().as_str() {
            "overall" | "1" => Ok(Self::Overall),
            "branch" | "2" => Ok(Self::Branch),
            "both" | "3" => Ok(Self::Both),
            other => Err(FeedbackLensError::ConfigValidation(format!(
                "unknown ratings scope: {other}"
            ))),
        }
    }
}
