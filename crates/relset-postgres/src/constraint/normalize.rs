//! Normal form of constraint trees.
//!
//! Two trees denote the same filter when their normal forms are identical.
//! The rewrites, applied bottom-up:
//!
//! 1. nested groups of the same operator are flattened;
//! 2. boolean literals are folded (identity elements dropped, absorbing
//!    elements short-circuit, `TRUE` under XOR becomes a negation);
//! 3. duplicate AND/OR operands are removed;
//! 4. identical XOR operands cancel pairwise;
//! 5. `NOT NOT p` becomes `p`, `NOT <literal>` is folded;
//! 6. `IN` lists are sorted and deduplicated; a single-element list becomes
//!    `=`, an empty list `FALSE`;
//! 7. operands are sorted by their canonical key;
//! 8. single-operand groups collapse, empty groups become their identity.
//!
//! Membership is "predicate IS TRUE", so `NOT` means "not true" and the
//! rewrites above are exact under NULL.

use super::node::{BoolOp, ConstraintNode, Predicate};
use crate::query::Operator;
use crate::Value;

pub(crate) fn normalize(node: &ConstraintNode) -> ConstraintNode {
    match node {
        ConstraintNode::Literal(b) => ConstraintNode::Literal(*b),
        ConstraintNode::Leaf(p) => normalize_leaf(p),
        ConstraintNode::Semijoin(s) => ConstraintNode::Semijoin(s.clone()),
        ConstraintNode::Not(inner) => match normalize(inner) {
            ConstraintNode::Literal(b) => ConstraintNode::Literal(!b),
            ConstraintNode::Not(x) => *x,
            other => ConstraintNode::Not(Box::new(other)),
        },
        ConstraintNode::Group { op, children } => normalize_group(*op, children),
    }
}

// Integer operands are widened so that equality does not depend on the
// width a value was bound with.
fn normalize_leaf(p: &Predicate) -> ConstraintNode {
    let leaf = |operator: Operator, value: Value| {
        ConstraintNode::Leaf(Predicate {
            operator,
            value,
            ..p.clone()
        })
    };
    match (&p.operator, &p.value) {
        (Operator::Eq, Value::Null) => ConstraintNode::Leaf(Predicate::is_null(p.column.clone())),
        (Operator::Ne, Value::Null) => leaf(Operator::IsNotNull, Value::Null),
        (Operator::In, Value::Array(items)) => {
            let mut items: Vec<Value> = items.iter().map(Value::widened).collect();
            items.sort_by_cached_key(Value::canonical_key);
            items.dedup();
            match items.len() {
                0 => ConstraintNode::Literal(false),
                1 if !items[0].is_null() => leaf(Operator::Eq, items.remove(0)),
                _ => leaf(Operator::In, Value::Array(items)),
            }
        }
        (op, value) => leaf(*op, value.widened()),
    }
}

fn normalize_group(op: BoolOp, children: &[ConstraintNode]) -> ConstraintNode {
    let mut operands = Vec::with_capacity(children.len());
    for child in children.iter().map(normalize) {
        match child {
            ConstraintNode::Group { op: inner, children: nested } if inner == op => {
                operands.extend(nested)
            }
            other => operands.push(other),
        }
    }

    let mut negated = false;
    let mut kept = Vec::with_capacity(operands.len());
    for operand in operands {
        match (op, operand) {
            (BoolOp::And, ConstraintNode::Literal(false)) => return ConstraintNode::Literal(false),
            (BoolOp::Or, ConstraintNode::Literal(true)) => return ConstraintNode::Literal(true),
            (BoolOp::Xor, ConstraintNode::Literal(true)) => negated = !negated,
            (_, ConstraintNode::Literal(_)) => {}
            (_, other) => kept.push(other),
        }
    }

    let mut keyed: Vec<(String, ConstraintNode)> =
        kept.into_iter().map(|n| (canonical_key(&n), n)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let kept: Vec<ConstraintNode> = match op {
        BoolOp::And | BoolOp::Or => {
            keyed.dedup_by(|a, b| a.0 == b.0);
            keyed.into_iter().map(|(_, n)| n).collect()
        }
        BoolOp::Xor => cancel_pairs(keyed),
    };

    let node = match kept.len() {
        0 => ConstraintNode::Literal(op.identity()),
        1 => kept.into_iter().next().unwrap_or(ConstraintNode::Literal(false)),
        _ => ConstraintNode::Group { op, children: kept },
    };

    if negated {
        normalize(&ConstraintNode::Not(Box::new(node)))
    } else {
        node
    }
}

// Input is sorted, so equal operands are adjacent.
fn cancel_pairs(keyed: Vec<(String, ConstraintNode)>) -> Vec<ConstraintNode> {
    let mut out: Vec<(String, ConstraintNode)> = Vec::with_capacity(keyed.len());
    for (key, node) in keyed {
        if out.last().is_some_and(|(last, _)| *last == key) {
            out.pop();
        } else {
            out.push((key, node));
        }
    }
    out.into_iter().map(|(_, n)| n).collect()
}

/// Deterministic textual key of a node. Applied to a normal form it is
/// itself canonical, since operands are already sorted.
pub(crate) fn canonical_key(node: &ConstraintNode) -> String {
    match node {
        ConstraintNode::Literal(true) => "T".to_string(),
        ConstraintNode::Literal(false) => "F".to_string(),
        ConstraintNode::Leaf(p) => format!(
            "L({:?}|{:?}|{}{})",
            p.column,
            p.operator,
            p.value.canonical_key(),
            if p.unaccent { "|U" } else { "" }
        ),
        ConstraintNode::Semijoin(s) => format!(
            "S({:?}|{}|{:?}|{})",
            s.columns,
            s.source.name,
            s.source_columns,
            s.source_tree.canonical_key()
        ),
        ConstraintNode::Not(inner) => format!("N({})", canonical_key(inner)),
        ConstraintNode::Group { op, children } => {
            let keys: Vec<String> = children.iter().map(canonical_key).collect();
            format!("G{:?}[{}]", op, keys.join(","))
        }
    }
}

/// `a ⊆ b` on normalized nodes. Every rule is sound; the test is incomplete.
pub(crate) fn implies_node(a: &ConstraintNode, b: &ConstraintNode) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (ConstraintNode::Literal(false), _) | (_, ConstraintNode::Literal(true)) => true,
        (_, ConstraintNode::Group { op: BoolOp::And, children }) => {
            children.iter().all(|c| implies_node(a, c))
        }
        (ConstraintNode::Group { op: BoolOp::Or, children }, _) => {
            children.iter().all(|c| implies_node(c, b))
        }
        (ConstraintNode::Group { op: BoolOp::And, children }, _)
            if children.iter().any(|c| implies_node(c, b)) =>
        {
            true
        }
        (_, ConstraintNode::Group { op: BoolOp::Or, children }) => {
            children.iter().any(|c| implies_node(a, c))
        }
        (ConstraintNode::Leaf(pa), ConstraintNode::Leaf(pb)) => leaf_implies(pa, pb),
        (_, ConstraintNode::Not(nb)) => disjoint(a, nb),
        _ => false,
    }
}

fn leaf_implies(a: &Predicate, b: &Predicate) -> bool {
    if a.column != b.column {
        return false;
    }
    match (a.operator, b.operator) {
        // any comparison that holds proves the value is not NULL
        (op, Operator::IsNotNull) => op != Operator::IsNull,
        _ if a.unaccent != b.unaccent => false,
        (Operator::Eq, Operator::In) => match &b.value {
            Value::Array(items) => items.contains(&a.value),
            _ => false,
        },
        (Operator::In, Operator::In) => match (&a.value, &b.value) {
            (Value::Array(xs), Value::Array(ys)) => xs.iter().all(|x| ys.contains(x)),
            _ => false,
        },
        _ => false,
    }
}

// `a` and `b` cannot both hold for one row.
fn disjoint(a: &ConstraintNode, b: &ConstraintNode) -> bool {
    match (a, b) {
        (ConstraintNode::Leaf(pa), ConstraintNode::Leaf(pb)) if pa.column == pb.column => {
            match (pa.operator, pb.operator) {
                (Operator::IsNull, op) | (op, Operator::IsNull) => op != Operator::IsNull,
                // distinct values may share an unaccented form
                (Operator::Eq, Operator::Eq) => {
                    !pa.unaccent
                        && !pb.unaccent
                        && pa.value != pb.value
                        && same_type(&pa.value, &pb.value)
                }
                _ => false,
            }
        }
        _ => false,
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
