use tracing::debug;

use crate::model::{ClassName, ClassificationResult, Role};

/// Expand a bundle classification into one result per granted class.
///
/// Levels carry the bundle's role; Body Movement and Shines are always
/// roleless. A bundle bought without a role still grants the solo classes.
/// Non-bundle results pass through unchanged. `order_id` is for logging.
pub fn expand(result: &ClassificationResult, order_id: i64) -> Vec<ClassificationResult> {
    if !result.is_bundle {
        return vec![result.clone()];
    }

    let mut out = Vec::with_capacity(ClassName::BUNDLE_CONTENTS.len());
    let mut dropped_levels = false;

    for class_name in ClassName::BUNDLE_CONTENTS {
        let role = if class_name.is_solo() {
            Role::NoRole
        } else if result.role.is_partnered() {
            result.role
        } else {
            dropped_levels = true;
            continue;
        };
        out.push(ClassificationResult {
            class_name,
            term: result.term.clone(),
            block: result.block,
            role,
            is_free: false,
            is_bundle: false,
        });
    }

    if dropped_levels {
        debug!(order_id, "bundle without role; level classes skipped");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TextClassifier;
    use crate::model::Block;

    #[test]
    fn bundle_with_role_grants_everything() {
        let r = TextClassifier::default().classify("Unlimited Bundle", "Term 2B / Leader");
        let out = expand(&r, 7);
        let classes: Vec<_> = out.iter().map(|r| r.class_name).collect();
        assert_eq!(classes, ClassName::BUNDLE_CONTENTS.to_vec());
        assert_eq!(out[0].role, Role::Leader);
        assert_eq!(out[2].role, Role::Leader);
        assert_eq!(out[3].role, Role::NoRole);
        assert_eq!(out[4].role, Role::NoRole);
        assert!(out.iter().all(|r| r.term.as_deref() == Some("2") && r.block == Block::B));
        assert!(out.iter().all(|r| !r.is_bundle));
    }

    #[test]
    fn bundle_without_role_keeps_solo_classes() {
        let r = TextClassifier::default().classify("Platinum Bundle", "Term 2");
        let out = expand(&r, 7);
        let classes: Vec<_> = out.iter().map(|r| r.class_name).collect();
        assert_eq!(classes, vec![ClassName::BodyMovement, ClassName::Shines]);
    }

    #[test]
    fn non_bundle_passes_through() {
        let r = TextClassifier::default().classify("Level 2", "Term 2A / Follower");
        assert_eq!(expand(&r, 7), vec![r]);
    }
}
