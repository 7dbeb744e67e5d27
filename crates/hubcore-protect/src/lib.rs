//! Branch protection evaluation: pure decision logic over a repository's
//! protection rules and the facts of one proposed push. No I/O — the write
//! pipeline fetches rules from the metadata store and facts from the Git
//! Engine/quarantine, then calls [`evaluate`].

use std::collections::HashSet;

use hubcore_storage::glob;
use serde::{Deserialize, Serialize};

/// One protection rule as stored against a repository. `pattern` is
/// matched against the short branch name (`main`, `release/*`), not the
/// full `refs/heads/...` path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectionRule {
    pub pattern: String,
    pub block_force_push: bool,
    pub block_deletion: bool,
    pub required_approving_review_count: u32,
    pub required_status_checks: Vec<String>,
    pub require_strict_status_checks: bool,
    pub admins_bypass: bool,
}

impl ProtectionRule {
    fn specificity(&self) -> u32 {
        glob::specificity(&self.pattern)
    }

    /// Combine two same-specificity matches into the stricter of the two,
    /// so a tie between equally-specific patterns never silently picks
    /// the looser rule.
    fn merge_stricter(&self, other: &Self) -> Self {
        Self {
            pattern: self.pattern.clone(),
            block_force_push: self.block_force_push || other.block_force_push,
            block_deletion: self.block_deletion || other.block_deletion,
            required_approving_review_count: self
                .required_approving_review_count
                .max(other.required_approving_review_count),
            required_status_checks: {
                let mut checks: HashSet<String> = self.required_status_checks.iter().cloned().collect();
                checks.extend(other.required_status_checks.iter().cloned());
                checks.into_iter().collect()
            },
            require_strict_status_checks: self.require_strict_status_checks || other.require_strict_status_checks,
            admins_bypass: self.admins_bypass && other.admins_bypass,
        }
    }
}

/// The facts of one proposed ref update, gathered by the write pipeline
/// before calling [`evaluate`].
#[derive(Debug, Clone)]
pub struct PushContext {
    pub branch: String,
    pub is_force_push: bool,
    pub is_deletion: bool,
    pub actor_is_admin: bool,
    pub approving_review_count: u32,
    pub passing_status_checks: HashSet<String>,
    pub branch_is_up_to_date_with_base: bool,
}

/// Why a push was blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    ForcePushBlocked,
    DeletionBlocked,
    InsufficientApprovals { required: u32, got: u32 },
    FailingStatusChecks(Vec<String>),
    BranchNotUpToDate,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForcePushBlocked => write!(f, "force push to a protected branch is not allowed"),
            Self::DeletionBlocked => write!(f, "deleting a protected branch is not allowed"),
            Self::InsufficientApprovals { required, got } => {
                write!(f, "requires {required} approving review(s), got {got}")
            }
            Self::FailingStatusChecks(checks) => {
                write!(f, "required status checks have not passed: {}", checks.join(", "))
            }
            Self::BranchNotUpToDate => write!(f, "branch must be up to date with its base before merging"),
        }
    }
}

/// Select the rule(s) matching `branch`, by descending specificity, merging
/// ties into their stricter combination. Returns `None` if nothing matches.
fn select_rule(rules: &[ProtectionRule], branch: &str) -> Option<ProtectionRule> {
    let mut matches: Vec<&ProtectionRule> = rules
        .iter()
        .filter(|r| glob::glob_match(&r.pattern, branch))
        .collect();
    if matches.is_empty() {
        return None;
    }
    matches.sort_by(|a, b| b.specificity().cmp(&a.specificity()));

    let top_specificity = matches[0].specificity();
    let mut winner = matches[0].clone();
    for rule in matches.into_iter().skip(1) {
        if rule.specificity() == top_specificity {
            winner = winner.merge_stricter(rule);
        } else {
            break;
        }
    }
    Some(winner)
}

/// Evaluate one proposed push against a repository's protection rules.
///
/// Admin bypass only ever exempts a rule's force-push/deletion/review/
/// status-check requirements — never the rule's existence: an admin still
/// goes through `evaluate`, they just automatically satisfy every
/// individual check an eligible rule carries.
pub fn evaluate(rules: &[ProtectionRule], ctx: &PushContext) -> Result<(), Violation> {
    let Some(rule) = select_rule(rules, &ctx.branch) else {
        return Ok(());
    };

    let bypassed = rule.admins_bypass && ctx.actor_is_admin;
    if bypassed {
        return Ok(());
    }

    if ctx.is_deletion {
        if rule.block_deletion {
            return Err(Violation::DeletionBlocked);
        }
        return Ok(());
    }

    if ctx.is_force_push && rule.block_force_push {
        return Err(Violation::ForcePushBlocked);
    }

    if ctx.approving_review_count < rule.required_approving_review_count {
        return Err(Violation::InsufficientApprovals {
            required: rule.required_approving_review_count,
            got: ctx.approving_review_count,
        });
    }

    let failing: Vec<String> = rule
        .required_status_checks
        .iter()
        .filter(|check| !ctx.passing_status_checks.contains(*check))
        .cloned()
        .collect();
    if !failing.is_empty() {
        return Err(Violation::FailingStatusChecks(failing));
    }

    if rule.require_strict_status_checks && !ctx.branch_is_up_to_date_with_base {
        return Err(Violation::BranchNotUpToDate);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_rule(pattern: &str) -> ProtectionRule {
        ProtectionRule {
            pattern: pattern.to_string(),
            block_force_push: true,
            block_deletion: true,
            required_approving_review_count: 0,
            required_status_checks: vec![],
            require_strict_status_checks: false,
            admins_bypass: false,
        }
    }

    fn base_ctx(branch: &str) -> PushContext {
        PushContext {
            branch: branch.to_string(),
            is_force_push: false,
            is_deletion: false,
            actor_is_admin: false,
            approving_review_count: 0,
            passing_status_checks: HashSet::new(),
            branch_is_up_to_date_with_base: true,
        }
    }

    #[test]
    fn unmatched_branch_has_no_restrictions() {
        let rules = vec![base_rule("main")];
        let ctx = base_ctx("feature/x");
        assert_eq!(evaluate(&rules, &ctx), Ok(()));
    }

    #[test]
    fn force_push_blocked_on_protected_branch() {
        let rules = vec![base_rule("main")];
        let mut ctx = base_ctx("main");
        ctx.is_force_push = true;
        assert_eq!(evaluate(&rules, &ctx), Err(Violation::ForcePushBlocked));
    }

    #[test]
    fn deletion_blocked_on_protected_branch() {
        let rules = vec![base_rule("main")];
        let mut ctx = base_ctx("main");
        ctx.is_deletion = true;
        assert_eq!(evaluate(&rules, &ctx), Err(Violation::DeletionBlocked));
    }

    #[test]
    fn admin_bypass_exempts_every_check() {
        let mut rule = base_rule("main");
        rule.admins_bypass = true;
        rule.required_approving_review_count = 2;
        let mut ctx = base_ctx("main");
        ctx.is_force_push = true;
        ctx.actor_is_admin = true;
        assert_eq!(evaluate(&[rule], &ctx), Ok(()));
    }

    #[test]
    fn insufficient_approvals_blocks_update() {
        let mut rule = base_rule("main");
        rule.block_force_push = false;
        rule.required_approving_review_count = 2;
        let mut ctx = base_ctx("main");
        ctx.approving_review_count = 1;
        assert_eq!(
            evaluate(&[rule], &ctx),
            Err(Violation::InsufficientApprovals { required: 2, got: 1 })
        );
    }

    #[test]
    fn failing_status_checks_reported_by_name() {
        let mut rule = base_rule("main");
        rule.block_force_push = false;
        rule.required_status_checks = vec!["ci/build".into(), "ci/test".into()];
        let mut ctx = base_ctx("main");
        ctx.passing_status_checks.insert("ci/build".into());
        assert_eq!(
            evaluate(&[rule], &ctx),
            Err(Violation::FailingStatusChecks(vec!["ci/test".into()]))
        );
    }

    #[test]
    fn exact_pattern_is_more_specific_than_wildcard() {
        let loose = {
            let mut r = base_rule("release/*");
            r.block_force_push = false;
            r
        };
        let strict = {
            let mut r = base_rule("release/1.0");
            r.block_force_push = true;
            r
        };
        let rules = vec![loose, strict];
        let mut ctx = base_ctx("release/1.0");
        ctx.is_force_push = true;
        assert_eq!(evaluate(&rules, &ctx), Err(Violation::ForcePushBlocked));
    }

    #[test]
    fn equally_specific_ties_merge_to_stricter() {
        let rules = vec![
            {
                let mut r = base_rule("main");
                r.block_force_push = false;
                r.required_approving_review_count = 1;
                r
            },
            {
                let mut r = base_rule("main");
                r.block_force_push = true;
                r.required_approving_review_count = 0;
                r
            },
        ];
        let mut ctx = base_ctx("main");
        ctx.is_force_push = true;
        assert_eq!(evaluate(&rules, &ctx), Err(Violation::ForcePushBlocked));
    }
}
