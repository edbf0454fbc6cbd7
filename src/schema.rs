// streamctl - CLI for the Stream activity log
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Known record fields and query filters.
//!
//! Nothing here is enforced: the store accepts fields and filters this
//! registry does not list. The registry supplies the default column set and
//! the `fields` listing.

use serde::Serialize;

/// Metadata about a record field
#[derive(Debug, Clone, Serialize)]
pub struct FieldMeta {
    pub name: &'static str,
    /// Field type (string, number, object)
    pub field_type: &'static str,
    pub description: &'static str,
    /// Shown by `query` when no `--fields` are given
    pub default: bool,
}

/// Metadata about a query filter
#[derive(Debug, Clone, Serialize)]
pub struct FilterMeta {
    pub name: &'static str,
    pub description: &'static str,
}

const fn field(
    name: &'static str,
    field_type: &'static str,
    description: &'static str,
    default: bool,
) -> FieldMeta {
    FieldMeta {
        name,
        field_type,
        description,
        default,
    }
}

const fn filter(name: &'static str, description: &'static str) -> FilterMeta {
    FilterMeta { name, description }
}

pub const RECORD_FIELDS: &[FieldMeta] = &[
    field("ID", "number", "Record ID", false),
    field("site_id", "number", "Network site the record belongs to", false),
    field("blog_id", "number", "Blog the record belongs to", false),
    field("object_id", "number", "ID of the object the event touched", false),
    field("user_id", "number", "ID of the user who triggered the event", true),
    field("user_role", "string", "Role of that user at the time", true),
    field("summary", "string", "Human readable description of the event", true),
    field("created", "string", "Time the record was created (GMT)", true),
    field("connector", "string", "Subsystem that logged the event", true),
    field("context", "string", "Object type within the connector", true),
    field("action", "string", "Verb of the event", true),
    field("ip", "string", "IP address of the request", true),
    field("meta", "object", "Additional connector-specific data", false),
    field("author_meta", "object", "Snapshot of the author (user_login, user_email, ...)", false),
];

pub const FILTERS: &[FilterMeta] = &[
    filter("author", "Only records by this user ID"),
    filter("author__in", "Only records by these user IDs"),
    filter("author__not_in", "Exclude records by these user IDs"),
    filter("author_role", "Only records by users of this role"),
    filter("author_role__in", "Only records by users of these roles"),
    filter("author_role__not_in", "Exclude records by users of these roles"),
    filter("date", "Only records created on this date (YYYY-MM-DD)"),
    filter("date_from", "Records created on or after this date"),
    filter("date_to", "Records created on or before this date"),
    filter("date_after", "Records created after this date"),
    filter("date_before", "Records created before this date"),
    filter("ip", "Only records from this IP"),
    filter("ip__in", "Only records from these IPs"),
    filter("ip__not_in", "Exclude records from these IPs"),
    filter("connector", "Only records of this connector"),
    filter("connector__in", "Only records of these connectors"),
    filter("connector__not_in", "Exclude records of these connectors"),
    filter("context", "Only records of this context"),
    filter("context__in", "Only records of these contexts"),
    filter("context__not_in", "Exclude records of these contexts"),
    filter("action", "Only records of this action"),
    filter("action__in", "Only records of these actions"),
    filter("action__not_in", "Exclude records of these actions"),
    filter("search", "Full text search"),
    filter("search_field", "Field the search runs against (default summary)"),
    filter("record", "Only the record with this ID"),
    filter("record__in", "Only records with these IDs"),
    filter("record__not_in", "Exclude records with these IDs"),
    filter("records_per_page", "Number of records to return"),
    filter("paged", "Page of results to return"),
    filter("order", "asc or desc"),
    filter("orderby", "Field to order by"),
];

pub fn default_fields() -> Vec<String> {
    RECORD_FIELDS
        .iter()
        .filter(|f| f.default)
        .map(|f| f.name.to_string())
        .collect()
}

pub fn is_documented_filter(name: &str) -> bool {
    FILTERS.iter().any(|f| f.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fields_follow_registry_order() {
        assert_eq!(
            default_fields(),
            vec![
                "user_id",
                "user_role",
                "summary",
                "created",
                "connector",
                "context",
                "action",
                "ip"
            ]
        );
    }

    #[test]
    fn knows_documented_filters() {
        assert!(is_documented_filter("author__not_in"));
        assert!(is_documented_filter("date_after"));
        assert!(!is_documented_filter("format"));
        assert!(!is_documented_filter("nonexistent"));
    }
}
