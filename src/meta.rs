//! Reshapes `/meta` responses into cube descriptors with fully qualified
//! `<Cube>.<field>` member names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, ToolError};

/// A measure, dimension, or segment. The remote schema does not distinguish
/// their structure, only their role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub member_type: Option<String>,
}

/// One analytical cube with its members grouped by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CubeDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub measures: Vec<MetricDescriptor>,
    pub dimensions: Vec<MetricDescriptor>,
    pub segments: Vec<MetricDescriptor>,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    cubes: Vec<MetaCube>,
}

#[derive(Debug, Deserialize)]
struct MetaCube {
    name: String,
    #[serde(default)]
    description: Option<String>,
    /// Members keyed by role; roles this server does not know about stay in
    /// here untouched and are dropped, so schema additions on the Cube.js
    /// side do not fail the whole call.
    #[serde(flatten)]
    members: BTreeMap<String, Value>,
}

const MEMBER_ROLES: [&str; 3] = ["measures", "dimensions", "segments"];

/// Parse a `/meta` response body into ordered cube descriptors.
///
/// An empty schema is a valid result, not an error.
pub fn parse_meta(body: &str) -> Result<Vec<CubeDescriptor>, ToolError> {
    let meta: MetaResponse = serde_json::from_str(body).map_err(|e| {
        ToolError::new(
            ErrorKind::UnexpectedResponse,
            format!("could not parse the Cube.js schema response: {e}"),
        )
    })?;

    meta.cubes.into_iter().map(reshape_cube).collect()
}

fn reshape_cube(cube: MetaCube) -> Result<CubeDescriptor, ToolError> {
    let mut grouped: [Vec<MetricDescriptor>; MEMBER_ROLES.len()] = Default::default();

    for (role, slot) in MEMBER_ROLES.iter().zip(grouped.iter_mut()) {
        let Some(raw) = cube.members.get(*role) else {
            continue;
        };
        let members: Vec<MetricDescriptor> = serde_json::from_value(raw.clone()).map_err(|e| {
            ToolError::new(
                ErrorKind::UnexpectedResponse,
                format!("malformed {role} list for cube {}: {e}", cube.name),
            )
        })?;
        *slot = members
            .into_iter()
            .map(|member| qualify(&cube.name, member))
            .collect();
    }

    let [measures, dimensions, segments] = grouped;
    Ok(CubeDescriptor {
        name: cube.name,
        description: cube.description,
        measures,
        dimensions,
        segments,
    })
}

/// Cube.js reports fully qualified member names; short names from older
/// schema versions are qualified against the owning cube.
fn qualify(cube: &str, mut member: MetricDescriptor) -> MetricDescriptor {
    if !member.name.contains('.') {
        member.name = format!("{}.{}", cube, member.name);
    }
    member
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_schema_is_an_empty_sequence() {
        assert_eq!(parse_meta(r#"{"cubes": []}"#).unwrap(), vec![]);
        assert_eq!(parse_meta(r#"{}"#).unwrap(), vec![]);
    }

    #[test]
    fn cubes_keep_schema_order_with_qualified_members() {
        let body = r#"{
            "cubes": [
                {
                    "name": "Orders",
                    "measures": [{"name": "count", "title": "Orders Count", "type": "number"}],
                    "dimensions": [{"name": "status", "type": "string"}],
                    "segments": []
                },
                {
                    "name": "Users",
                    "measures": [{"name": "count"}],
                    "dimensions": [{"name": "status"}],
                    "segments": []
                }
            ]
        }"#;

        let cubes = parse_meta(body).unwrap();
        assert_eq!(cubes.len(), 2);
        assert_eq!(cubes[0].name, "Orders");
        assert_eq!(cubes[1].name, "Users");
        assert_eq!(cubes[0].measures[0].name, "Orders.count");
        assert_eq!(cubes[0].measures[0].title.as_deref(), Some("Orders Count"));
        assert_eq!(cubes[0].dimensions[0].name, "Orders.status");
        assert_eq!(cubes[1].measures[0].name, "Users.count");
        assert_eq!(cubes[1].dimensions[0].name, "Users.status");
    }

    #[test]
    fn already_qualified_names_are_kept() {
        let body = r#"{
            "cubes": [
                {"name": "Orders", "measures": [{"name": "Orders.count"}]}
            ]
        }"#;

        let cubes = parse_meta(body).unwrap();
        assert_eq!(cubes[0].measures[0].name, "Orders.count");
        assert!(cubes[0].dimensions.is_empty());
        assert!(cubes[0].segments.is_empty());
    }

    #[test]
    fn unrecognized_roles_are_dropped_silently() {
        let body = r#"{
            "cubes": [
                {
                    "name": "Orders",
                    "title": "All orders",
                    "measures": [{"name": "count"}],
                    "hierarchies": [{"name": "geo", "levels": ["country", "city"]}]
                }
            ]
        }"#;

        let cubes = parse_meta(body).unwrap();
        assert_eq!(cubes[0].measures.len(), 1);
        assert!(cubes[0].dimensions.is_empty());
    }

    #[test]
    fn description_is_carried_through() {
        let body = r#"{
            "cubes": [
                {"name": "Orders", "description": "Customer orders", "measures": []}
            ]
        }"#;

        let cubes = parse_meta(body).unwrap();
        assert_eq!(cubes[0].description.as_deref(), Some("Customer orders"));
    }

    #[test]
    fn malformed_role_list_is_an_unexpected_response() {
        let body = r#"{"cubes": [{"name": "Orders", "measures": "count"}]}"#;
        let err = parse_meta(body).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnexpectedResponse);
    }

    #[test]
    fn non_json_body_is_an_unexpected_response() {
        let err = parse_meta("<html>502</html>").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnexpectedResponse);
    }
}
