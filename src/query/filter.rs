//! Annotation filters and sorting
//!
//! Filters use the `{field, op, value}` shape the backend's query endpoint
//! accepts, so the same `AnnotationQuery` can be sent to the server or
//! evaluated locally with `apply`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, TatError};
use crate::model::{Annotation, ScoreCategory, Status};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Status,
    Tag,
    CanonicalId,
    EntityP,
}

impl FilterField {
    fn is_numeric(&self) -> bool {
        matches!(self, FilterField::EntityP)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
}

/// A single value or a list of values
fn one_or_many<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<Value>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(values) => values,
        Value::Null => Vec::new(),
        single => vec![single],
    })
}

fn value_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: FilterField,
    pub op: FilterOp,
    #[serde(deserialize_with = "one_or_many")]
    pub value: Vec<Value>,
}

impl Filter {
    pub fn eq(field: FilterField, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self {
            field,
            op: FilterOp::Eq,
            value: values.into_iter().map(Into::into).collect(),
        }
    }

    /// True when any value satisfies the comparison
    pub fn matches(&self, annotation: &Annotation) -> bool {
        match self.op {
            FilterOp::Eq if self.field.is_numeric() => self
                .value
                .iter()
                .filter_map(value_f64)
                .any(|v| v == annotation.entity_p),
            FilterOp::Eq => {
                let Some(actual) = field_str(annotation, self.field) else {
                    return false;
                };
                self.value.iter().filter_map(value_str).any(|v| v == actual)
            }
            FilterOp::Gte | FilterOp::Lte => {
                let actual = annotation.entity_p;
                self.value.iter().filter_map(value_f64).any(|bound| {
                    if self.op == FilterOp::Gte { actual >= bound } else { actual <= bound }
                })
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.op != FilterOp::Eq && !self.field.is_numeric() {
            return Err(TatError::invalid_input(format!("{:?} supports only '==' filters", self.field)));
        }
        if self.field == FilterField::Status {
            for value in &self.value {
                let raw = value_str(value).unwrap_or_default();
                raw.parse::<Status>()?;
            }
        }
        Ok(())
    }
}

fn field_str(annotation: &Annotation, field: FilterField) -> Option<String> {
    match field {
        FilterField::Status => Some(annotation.status.as_str().to_string()),
        FilterField::Tag => Some(annotation.tag.clone()),
        FilterField::CanonicalId => annotation.canonical_id.clone(),
        FilterField::EntityP => Some(annotation.entity_p.to_string()),
    }
}

// =============================================================================
// Sorting
// =============================================================================

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Start,
    Tag,
    Status,
    EntityP,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortKey,
    #[serde(default)]
    pub desc: bool,
}

/// Stable sort; ties keep document order
pub fn sort_annotations(annotations: &mut [&Annotation], key: SortKey, desc: bool) {
    annotations.sort_by(|a, b| {
        let ord = match key {
            SortKey::Start => a.start.cmp(&b.start),
            SortKey::Tag => a.tag.cmp(&b.tag),
            SortKey::Status => a.status.rank().cmp(&b.status.rank()),
            SortKey::EntityP => a.entity_p.total_cmp(&b.entity_p),
        };
        if desc { ord.reverse() } else { ord }
    });
}

// =============================================================================
// Query
// =============================================================================

/// Filter set plus optional sort, as held by the annotation list
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnnotationQuery {
    #[serde(default)]
    pub filter: Vec<Filter>,
    #[serde(default)]
    pub sort: Option<SortSpec>,
    /// Untouched by the user; the unfiltered list is shown
    #[serde(default = "default_true", alias = "isDefault")]
    pub is_default: bool,
}

fn default_true() -> bool { true }

impl Default for AnnotationQuery {
    fn default() -> Self {
        Self {
            filter: Vec::new(),
            sort: None,
            is_default: true,
        }
    }
}

impl AnnotationQuery {
    /// Build `==` filters from form selections, dropping empty ones
    pub fn from_selections<I, V>(selections: I) -> Result<Self>
    where
        I: IntoIterator<Item = (FilterField, Vec<V>)>,
        V: Into<Value>,
    {
        let filter: Vec<Filter> = selections
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(field, values)| Filter::eq(field, values))
            .collect();
        for f in &filter {
            f.validate()?;
        }
        Ok(Self {
            filter,
            sort: None,
            is_default: false,
        })
    }

    /// Add the `entity_p` range of a confidence category
    pub fn with_confidence(mut self, category: ScoreCategory) -> Self {
        let (min, max) = category.range();
        self.filter.retain(|f| f.field != FilterField::EntityP);
        self.filter.push(Filter { field: FilterField::EntityP, op: FilterOp::Gte, value: vec![min.into()] });
        self.filter.push(Filter { field: FilterField::EntityP, op: FilterOp::Lte, value: vec![max.into()] });
        self.is_default = false;
        self
    }

    pub fn with_sort(mut self, field: SortKey, desc: bool) -> Self {
        self.sort = Some(SortSpec { field, desc });
        self.is_default = false;
        self
    }

    /// Remove one value from filter `index`; the filter goes when its last value does
    pub fn remove_value(&mut self, index: usize, value: &Value) {
        let Some(filter) = self.filter.get_mut(index) else {
            return;
        };
        if let Some(pos) = filter.value.iter().position(|v| v == value) {
            filter.value.remove(pos);
        }
        if filter.value.is_empty() {
            self.filter.remove(index);
        }
        self.is_default = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn validate(&self) -> Result<()> {
        self.filter.iter().try_for_each(Filter::validate)
    }

    /// Every filter must match
    pub fn matches(&self, annotation: &Annotation) -> bool {
        self.filter.iter().all(|f| f.matches(annotation))
    }

    pub fn apply<'a>(&self, annotations: &'a [Annotation]) -> Vec<&'a Annotation> {
        let mut out: Vec<&Annotation> = annotations.iter().filter(|a| self.matches(a)).collect();
        if let Some(sort) = self.sort {
            sort_annotations(&mut out, sort.field, sort.desc);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(id: &str, start: usize, tag: &str, status: Status, canonical: &str, p: f64) -> Annotation {
        Annotation {
            id: id.to_string(),
            start,
            end: start + 3,
            text: "abc".to_string(),
            tag: tag.to_string(),
            status,
            canonical_id: Some(canonical.to_string()),
            canonical_name: None,
            entity_p: p,
            datetime_modified: None,
            datetime_reviewed: None,
        }
    }

    fn sample() -> Vec<Annotation> {
        vec![
            ann("a", 0, "genetics", Status::Accepted, "C1", 0.995),
            ann("b", 10, "species & viruses", Status::NotReviewed, "C2", 0.75),
            ann("c", 20, "genetics", Status::Rejected, "C1", 0.40),
            ann("d", 30, "chemicals", Status::NotReviewed, "C3", 0.92),
        ]
    }

    fn ids(annotations: &[&Annotation]) -> Vec<String> {
        annotations.iter().map(|a| a.id.clone()).collect()
    }

    #[test]
    fn test_backend_shape_parsing() {
        let json = r#"{
            "filter": [
                {"field": "status", "op": "==", "value": ["NOT_REVIEWED", "ACCEPTED"]},
                {"field": "canonical_id", "op": "==", "value": "C1"}
            ],
            "isDefault": false
        }"#;
        let query: AnnotationQuery = serde_json::from_str(json).unwrap();

        assert!(!query.is_default);
        assert_eq!(query.filter[1].value.len(), 1);
        assert_eq!(ids(&query.apply(&sample())), vec!["a"]);
    }

    #[test]
    fn test_from_selections_drops_empty() {
        let query = AnnotationQuery::from_selections(vec![
            (FilterField::Tag, vec!["genetics"]),
            (FilterField::Status, vec![]),
        ])
        .unwrap();

        assert_eq!(query.filter.len(), 1);
        assert_eq!(ids(&query.apply(&sample())), vec!["a", "c"]);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let result = AnnotationQuery::from_selections(vec![(FilterField::Status, vec!["DONE"])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_confidence_range() {
        let query = AnnotationQuery::default().with_confidence(ScoreCategory::Moderate);
        assert_eq!(ids(&query.apply(&sample())), vec!["b"]);
    }

    #[test]
    fn test_remove_value_and_clear() {
        let mut query = AnnotationQuery::from_selections(vec![(FilterField::Tag, vec!["genetics", "chemicals"])]).unwrap();
        query.remove_value(0, &Value::from("genetics"));
        assert_eq!(ids(&query.apply(&sample())), vec!["d"]);

        query.remove_value(0, &Value::from("chemicals"));
        assert!(query.filter.is_empty());
        assert_eq!(query.apply(&sample()).len(), 4);

        query.clear();
        assert!(query.is_default);
    }

    #[test]
    fn test_sorting() {
        let anns = sample();
        let query = AnnotationQuery::default().with_sort(SortKey::EntityP, true);
        assert_eq!(ids(&query.apply(&anns)), vec!["a", "d", "b", "c"]);

        let by_status = AnnotationQuery::default().with_sort(SortKey::Status, false);
        assert_eq!(ids(&by_status.apply(&anns)), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_ordering_ops_only_for_confidence() {
        let query = AnnotationQuery {
            filter: vec![Filter { field: FilterField::Tag, op: FilterOp::Gte, value: vec!["a".into()] }],
            sort: None,
            is_default: false,
        };
        assert!(query.validate().is_err());
    }
}
