//! Set algebra over relation instances.

use std::ops::{BitAnd, BitOr, BitXor, Not, Sub};
use std::sync::Arc;

use super::Relation;
use crate::constraint::{ConstraintNode, ConstraintTree, Semijoin};
use crate::model::Model;
use crate::schema::RelationMetadata;
use crate::{RelsetError, Result};

pub(super) fn same_relation(left: &Arc<RelationMetadata>, right: &Arc<RelationMetadata>) -> bool {
    Arc::ptr_eq(left, right) || left == right
}

impl Relation {
    fn check_compatible(&self, other: &Relation) -> Result<()> {
        if same_relation(&self.meta, &other.meta) {
            Ok(())
        } else {
            Err(RelsetError::IncompatibleRelation {
                left: self.meta.name.to_string(),
                right: other.meta.name.to_string(),
            })
        }
    }

    /// Rows in both instances. Read options come from `self`.
    ///
    /// # Errors
    ///
    /// `IncompatibleRelation` if `other` is bound to another relation.
    pub fn intersect(&self, other: &Relation) -> Result<Relation> {
        self.check_compatible(other)?;
        Ok(self.derive(self.tree.intersect(&other.tree)))
    }

    /// Rows in either instance.
    pub fn union(&self, other: &Relation) -> Result<Relation> {
        self.check_compatible(other)?;
        Ok(self.derive(self.tree.union(&other.tree)))
    }

    /// Rows in exactly one of the instances.
    pub fn symmetric_difference(&self, other: &Relation) -> Result<Relation> {
        self.check_compatible(other)?;
        Ok(self.derive(self.tree.symmetric_difference(&other.tree)))
    }

    /// Rows in `self` but not in `other`.
    pub fn difference(&self, other: &Relation) -> Result<Relation> {
        self.check_compatible(other)?;
        Ok(self.derive(self.tree.difference(&other.tree)))
    }

    /// Rows of the relation outside this instance. NULL comparisons count
    /// as "not matching", so `a` and `!a` always partition the relation.
    pub fn complement(&self) -> Relation {
        self.derive(self.tree.complement())
    }

    /// Provable without the database that every row of `self` is in `other`.
    /// `Ok(false)` only means the structural test could not prove it; use
    /// `contains` for the exact answer.
    pub fn implies(&self, other: &Relation) -> Result<bool> {
        self.check_compatible(other)?;
        Ok(self.tree.implies(&other.tree))
    }

    /// Every row of `other` is a row of `self`, checked by counting
    /// `other − self` on the database.
    pub async fn contains(&self, model: &Model, other: &Relation) -> Result<bool> {
        self.check_compatible(other)?;
        if other.tree.implies(&self.tree) {
            return Ok(true);
        }
        let outside = Relation::new(Arc::clone(&self.meta)).derive(other.tree.difference(&self.tree));
        Ok(outside.count(model).await? == 0)
    }

    /// Both instances hold the same rows.
    pub async fn same_set(&self, model: &Model, other: &Relation) -> Result<bool> {
        if self == other {
            return Ok(true);
        }
        Ok(self.contains(model, other).await? && other.contains(model, self).await?)
    }

    /// Follows the foreign key `fkey_name` one level: the rows of the
    /// referenced relation that rows of this instance point to. An incoming
    /// key (`_reverse_fkey_...`) is followed backwards, to the rows pointing
    /// at this instance.
    ///
    /// # Errors
    ///
    /// `Validation` if the relation has no such foreign key,
    /// `RelationNotFound` if the referenced relation cannot be resolved.
    pub async fn follow(&self, model: &Model, fkey_name: &str) -> Result<Relation> {
        let fkey = self.meta.get_foreign_key(fkey_name).ok_or_else(|| {
            RelsetError::Validation(format!(
                "{} has no foreign key '{}'",
                self.meta.name, fkey_name
            ))
        })?;
        let target = model.metadata(&fkey.referenced).await?;
        Ok(follow_into(self, target, &fkey.columns, &fkey.referenced_columns))
    }
}

fn follow_into(
    source: &Relation,
    target: Arc<RelationMetadata>,
    source_columns: &[String],
    target_columns: &[String],
) -> Relation {
    let semijoin = Semijoin {
        columns: target_columns.to_vec(),
        source: Arc::clone(&source.meta),
        source_columns: source_columns.to_vec(),
        source_tree: Box::new(source.tree.clone()),
    };
    Relation::new(target).derive(ConstraintTree::from_node(ConstraintNode::Semijoin(semijoin)))
}

impl BitAnd for &Relation {
    type Output = Result<Relation>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersect(rhs)
    }
}

impl BitOr for &Relation {
    type Output = Result<Relation>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitXor for &Relation {
    type Output = Result<Relation>;

    fn bitxor(self, rhs: Self) -> Self::Output {
        self.symmetric_difference(rhs)
    }
}

impl Sub for &Relation {
    type Output = Result<Relation>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.difference(rhs)
    }
}

impl Not for &Relation {
    type Output = Relation;

    fn not(self) -> Self::Output {
        self.complement()
    }
}
