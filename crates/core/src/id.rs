//! Unique identifiers for graph engine entities.
//!
//! Strongly-typed UUID identifiers built on [`domain-key`](https://crates.io/crates/domain-key)
//! `Uuid<D>` wrappers. Each id type is parameterized by a unique domain
//! marker, so a `NodeId` and a `DefinitionId` can never be mixed up at a call
//! site even though both are backed by the same 16-byte representation.
//!
//! All id types are `Copy` and support `v4()`, `nil()`, `parse(&str)`, full
//! serde support (serializes as a UUID string), `Display`, `FromStr`, `Eq`,
//! `Ord`, `Hash`.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(NodeIdDomain => NodeId);
define_uuid!(ConnectionIdDomain => ConnectionId);
define_uuid!(ExecutionIdDomain => ExecutionId);
define_uuid!(GroupIdDomain => GroupId);
define_uuid!(DefinitionIdDomain => DefinitionId);
define_uuid!(JobIdDomain => JobId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_v4_creates_non_nil_uuid() {
        let id = NodeId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn execution_id_v4_creates_non_nil_uuid() {
        let id = ExecutionId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn id_nil_creates_zero_valued_uuid() {
        let id = NodeId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn id_parse_valid_uuid_string_succeeds() {
        let id = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(!id.is_nil());
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn id_parse_invalid_string_returns_error() {
        let result = NodeId::parse("not-a-uuid");
        assert!(result.is_err());
    }

    #[test]
    fn id_copy_semantics_both_copies_usable() {
        let id1 = NodeId::v4();
        let id2 = id1;
        assert_eq!(id1, id2);
    }

    #[test]
    fn id_serde_json_roundtrip() {
        let id = GroupId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn different_id_types_are_incompatible() {
        fn accepts_node(_id: NodeId) {}
        fn accepts_connection(_id: ConnectionId) {}

        let node = NodeId::v4();
        let conn = ConnectionId::v4();
        accepts_node(node);
        accepts_connection(conn);
        // accepts_node(conn); // would not compile
    }

    #[test]
    fn id_ordering_is_consistent() {
        let a = NodeId::nil();
        let b = NodeId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert!(a < b);
    }

    #[test]
    fn id_hash_is_consistent() {
        use std::collections::HashSet;
        let id = JobId::v4();
        let mut set = HashSet::new();
        set.insert(id);
        assert!(set.contains(&id));
    }
}
