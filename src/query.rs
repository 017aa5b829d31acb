//! Query construction and validation. Validation here is purely syntactic;
//! whether a member exists on the target cube is decided by Cube.js.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, ToolError};
use crate::meta::MetricDescriptor;

/// Comparison operators accepted in filter clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Gte,
    Lte,
    Contains,
    In,
}

impl FilterOperator {
    /// Accepts both the symbolic form used in flat filter strings and the
    /// Cube.js wire name.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "equals" => Some(Self::Equals),
            "!=" | "notEquals" => Some(Self::NotEquals),
            ">" | "gt" => Some(Self::Gt),
            "<" | "lt" => Some(Self::Lt),
            ">=" | "gte" => Some(Self::Gte),
            "<=" | "lte" => Some(Self::Lte),
            "contains" => Some(Self::Contains),
            "in" => Some(Self::In),
            _ => None,
        }
    }

    /// Operator name in the Cube.js filter format. `in` maps onto the
    /// multi-valued `equals` operator, which is how Cube.js expresses
    /// membership tests.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Equals | Self::In => "equals",
            Self::NotEquals => "notEquals",
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Contains => "contains",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for FilterOperator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for FilterOperator {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::parse(&token)
            .ok_or_else(|| de::Error::custom(format!("unknown filter operator {token:?}")))
    }
}

/// One filter condition against a cube member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub member: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

/// Filter as supplied by the caller: either a flat textual condition such
/// as `"Orders.created_date > 2024-01-01"` or an already structured clause.
/// Both resolve to a [`FilterClause`] through one explicit parse step.
#[derive(Debug, Clone)]
pub enum FilterInput {
    Raw(String),
    Structured(FilterClause),
}

impl FilterInput {
    pub fn resolve(self) -> Result<FilterClause, ToolError> {
        match self {
            Self::Raw(raw) => parse_filter(&raw),
            Self::Structured(clause) => Ok(clause),
        }
    }
}

/// Parse a flat `"<member> <operator> <value>"` condition.
///
/// The value for `in` is a comma-separated list; every other operator takes
/// the remainder of the string as a single value.
pub fn parse_filter(raw: &str) -> Result<FilterClause, ToolError> {
    let mut tokens = raw.trim().split_whitespace();
    let (Some(member), Some(operator_token)) = (tokens.next(), tokens.next()) else {
        return Err(ToolError::invalid_query(format!(
            "unparseable filter clause {raw:?}: expected \"<member> <operator> <value>\""
        )));
    };

    let Some(operator) = FilterOperator::parse(operator_token) else {
        return Err(ToolError::invalid_query(format!(
            "unparseable filter clause {raw:?}: unknown operator {operator_token:?}"
        )));
    };

    let value = tokens.collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err(ToolError::invalid_query(format!(
            "unparseable filter clause {raw:?}: missing value"
        )));
    }

    let values: Vec<String> = match operator {
        FilterOperator::In => value
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect(),
        _ => vec![value],
    };
    if values.is_empty() {
        return Err(ToolError::invalid_query(format!(
            "unparseable filter clause {raw:?}: missing value"
        )));
    }

    Ok(FilterClause {
        member: member.to_string(),
        operator,
        values,
    })
}

/// A validated query, ready to be encoded for the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    /// Target cube; implied by the member names on the wire.
    #[serde(skip)]
    pub cube_name: String,
    pub measures: Vec<String>,
    pub dimensions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterClause>,
}

impl QueryRequest {
    pub fn encode(&self) -> Result<String, ToolError> {
        serde_json::to_string(self)
            .map_err(|e| ToolError::invalid_query(format!("could not encode query: {e}")))
    }
}

/// Validate and assemble a query. Fails with `InvalidQuery` before any
/// network call when the parameters are malformed.
pub fn build_query(
    cube_name: &str,
    measures: Vec<String>,
    dimensions: Vec<String>,
    filters: Vec<FilterInput>,
) -> Result<QueryRequest, ToolError> {
    if cube_name.trim().is_empty() {
        return Err(ToolError::invalid_query("cube name must not be empty"));
    }
    if measures.is_empty() && dimensions.is_empty() {
        return Err(ToolError::invalid_query(format!(
            "a query against {cube_name} must request at least one measure or dimension"
        )));
    }

    let measures = validate_members("measure", measures)?;
    let dimensions = validate_members("dimension", dimensions)?;

    let filters = filters
        .into_iter()
        .map(FilterInput::resolve)
        .collect::<Result<Vec<_>, _>>()?;
    for clause in &filters {
        // The filter may reference the queried cube or an explicitly joined
        // one; join validity is decided by Cube.js, only the syntax is
        // checked here.
        if !is_member_name(&clause.member) {
            return Err(ToolError::invalid_query(format!(
                "filter member {:?} is not of the form <Cube>.<field>",
                clause.member
            )));
        }
    }

    Ok(QueryRequest {
        cube_name: cube_name.to_string(),
        measures,
        dimensions,
        filters,
    })
}

fn validate_members(role: &str, names: Vec<String>) -> Result<Vec<String>, ToolError> {
    let mut deduped: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        if !is_member_name(&name) {
            return Err(ToolError::invalid_query(format!(
                "{role} {name:?} is not of the form <Cube>.<field>"
            )));
        }
        if !deduped.contains(&name) {
            deduped.push(name);
        }
    }
    Ok(deduped)
}

fn is_member_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((cube, field)) => {
            !cube.is_empty() && !field.is_empty() && !name.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Result of a `/load` call: rows plus the member annotation, reshaped into
/// a flat member-name index. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<Map<String, Value>>,
    pub annotation: BTreeMap<String, MetricDescriptor>,
}

/// Parse a `/load` response body.
///
/// Cube.js groups the annotation by member role; the groups are flattened
/// into one map keyed by fully qualified member name.
pub fn parse_load_response(body: &str) -> Result<QueryResult, ToolError> {
    #[derive(Deserialize)]
    struct LoadResponse {
        data: Option<Vec<Map<String, Value>>>,
        #[serde(default)]
        annotation: BTreeMap<String, Value>,
    }

    let load: LoadResponse = serde_json::from_str(body).map_err(|e| {
        ToolError::new(
            ErrorKind::UnexpectedResponse,
            format!("could not parse the Cube.js load response: {e}"),
        )
    })?;

    let Some(rows) = load.data else {
        // A 200 without data happens when Cube.js reports an in-band error,
        // e.g. "Continue wait" while a pre-aggregation builds.
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| "response carried no data".to_string());
        return Err(ToolError::new(
            ErrorKind::UnexpectedResponse,
            format!("Cube.js returned no result rows: {detail}"),
        ));
    };

    let mut annotation = BTreeMap::new();
    for group in load.annotation.values() {
        let Some(members) = group.as_object() else {
            continue;
        };
        for (name, desc) in members {
            annotation.insert(
                name.clone(),
                MetricDescriptor {
                    name: name.clone(),
                    title: desc.get("title").and_then(Value::as_str).map(str::to_string),
                    member_type: desc.get("type").and_then(Value::as_str).map(str::to_string),
                },
            );
        }
    }

    Ok(QueryResult { rows, annotation })
}
