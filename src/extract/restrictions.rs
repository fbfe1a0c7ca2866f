//! Turn-restriction relation recognition.
//!
//! A pure function of the relation, safe to call from any worker thread.
//! Only the simple (from-way, via-node, to-way) shape is supported;
//! anything else is rejected.

use crate::reader::{MemberKind, RawRelation};
use crate::types::InputRestriction;

/// Vehicle classes whose presence in `except=` exempts the restriction
/// for the car pipeline.
const EXCEPT_CLASSES: &[&str] = &["motorcar", "motor_vehicle", "vehicle"];

/// Recognize a turn restriction. Returns `None` for relations that are not
/// restrictions, are exempted, or do not have exactly one from-way, one
/// to-way and one via-node.
pub fn parse_restriction(relation: &RawRelation) -> Option<InputRestriction> {
    if relation.tag("type") != Some("restriction") {
        return None;
    }

    let restriction = relation.tag("restriction")?;
    let is_only = if restriction.starts_with("only_") {
        true
    } else if restriction.starts_with("no_") {
        false
    } else {
        return None;
    };

    if let Some(except) = relation.tag("except") {
        if except
            .split(';')
            .any(|class| EXCEPT_CLASSES.contains(&class.trim()))
        {
            return None;
        }
    }

    let mut from_way = None;
    let mut to_way = None;
    let mut via_node = None;

    for member in &relation.members {
        match (member.kind, member.role.as_str()) {
            (MemberKind::Way, "from") => {
                if from_way.replace(member.ref_id).is_some() {
                    return None; // duplicate from member
                }
            }
            (MemberKind::Way, "to") => {
                if to_way.replace(member.ref_id).is_some() {
                    return None;
                }
            }
            (MemberKind::Node, "via") => {
                if via_node.replace(member.ref_id).is_some() {
                    return None;
                }
            }
            // Via-way restrictions and decorative members are out of scope.
            (MemberKind::Way, "via") => return None,
            _ => {}
        }
    }

    Some(InputRestriction {
        from_way: from_way?,
        via_node: via_node?,
        to_way: to_way?,
        is_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::RelationMember;

    fn member(kind: MemberKind, ref_id: u64, role: &str) -> RelationMember {
        RelationMember {
            kind,
            ref_id,
            role: role.to_string(),
        }
    }

    fn relation(tags: &[(&str, &str)], members: Vec<RelationMember>) -> RawRelation {
        RawRelation {
            id: 1,
            members,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn simple_members() -> Vec<RelationMember> {
        vec![
            member(MemberKind::Way, 10, "from"),
            member(MemberKind::Node, 5, "via"),
            member(MemberKind::Way, 20, "to"),
        ]
    }

    #[test]
    fn test_no_left_turn() {
        let rel = relation(
            &[("type", "restriction"), ("restriction", "no_left_turn")],
            simple_members(),
        );
        let parsed = parse_restriction(&rel).unwrap();
        assert_eq!(parsed.from_way, 10);
        assert_eq!(parsed.via_node, 5);
        assert_eq!(parsed.to_way, 20);
        assert!(!parsed.is_only);
    }

    #[test]
    fn test_only_straight_on() {
        let rel = relation(
            &[("type", "restriction"), ("restriction", "only_straight_on")],
            simple_members(),
        );
        assert!(parse_restriction(&rel).unwrap().is_only);
    }

    #[test]
    fn test_non_restriction_relation() {
        let rel = relation(&[("type", "route")], simple_members());
        assert!(parse_restriction(&rel).is_none());
    }

    #[test]
    fn test_unknown_restriction_value() {
        let rel = relation(
            &[("type", "restriction"), ("restriction", "maybe_left_turn")],
            simple_members(),
        );
        assert!(parse_restriction(&rel).is_none());
    }

    #[test]
    fn test_missing_via_node() {
        let rel = relation(
            &[("type", "restriction"), ("restriction", "no_u_turn")],
            vec![
                member(MemberKind::Way, 10, "from"),
                member(MemberKind::Way, 20, "to"),
            ],
        );
        assert!(parse_restriction(&rel).is_none());
    }

    #[test]
    fn test_via_way_rejected() {
        let rel = relation(
            &[("type", "restriction"), ("restriction", "no_left_turn")],
            vec![
                member(MemberKind::Way, 10, "from"),
                member(MemberKind::Way, 15, "via"),
                member(MemberKind::Way, 20, "to"),
            ],
        );
        assert!(parse_restriction(&rel).is_none());
    }

    #[test]
    fn test_duplicate_from_rejected() {
        let mut members = simple_members();
        members.push(member(MemberKind::Way, 11, "from"));
        let rel = relation(
            &[("type", "restriction"), ("restriction", "no_left_turn")],
            members,
        );
        assert!(parse_restriction(&rel).is_none());
    }

    #[test]
    fn test_except_motorcar() {
        let rel = relation(
            &[
                ("type", "restriction"),
                ("restriction", "no_left_turn"),
                ("except", "bicycle;motorcar"),
            ],
            simple_members(),
        );
        assert!(parse_restriction(&rel).is_none());
    }
}
