/// Effective permission level a principal holds on a repository.
///
/// Ordered so that `a >= b` means "a can do everything b can" — callers
/// compare capabilities directly rather than matching on variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    None,
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

impl Capability {
    pub fn can_read(self) -> bool {
        self >= Capability::Read
    }

    pub fn can_write(self) -> bool {
        self >= Capability::Write
    }

    pub fn can_administer(self) -> bool {
        self >= Capability::Admin
    }
}

/// Every fact that can grant access to a repository, already resolved by
/// the metadata store (ownership chain, org membership, team membership,
/// direct collaborator grant). This crate only combines them; it never
/// queries the database itself, so it stays testable without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityFacts {
    pub is_owner: bool,
    pub org_role: Option<Capability>,
    pub team_role: Option<Capability>,
    pub collaborator_role: Option<Capability>,
    pub repository_is_public: bool,
}

/// Combine every source of access into one effective capability: the
/// highest of all of them wins, with ownership always granting `Admin` and
/// public visibility granting at least `Read` to anyone (including an
/// anonymous caller, for whom every other field is `None`/`false`).
pub fn resolve(facts: CapabilityFacts) -> Capability {
    let mut best = Capability::None;

    if facts.is_owner {
        best = best.max(Capability::Admin);
    }
    if let Some(role) = facts.org_role {
        best = best.max(role);
    }
    if let Some(role) = facts.team_role {
        best = best.max(role);
    }
    if let Some(role) = facts.collaborator_role {
        best = best.max(role);
    }
    if facts.repository_is_public {
        best = best.max(Capability::Read);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_always_gets_admin() {
        let facts = CapabilityFacts {
            is_owner: true,
            ..Default::default()
        };
        assert_eq!(resolve(facts), Capability::Admin);
    }

    #[test]
    fn public_repo_grants_anonymous_read() {
        let facts = CapabilityFacts {
            repository_is_public: true,
            ..Default::default()
        };
        assert_eq!(resolve(facts), Capability::Read);
    }

    #[test]
    fn private_repo_grants_nothing_by_default() {
        assert_eq!(resolve(CapabilityFacts::default()), Capability::None);
    }

    #[test]
    fn highest_of_several_roles_wins() {
        let facts = CapabilityFacts {
            org_role: Some(Capability::Read),
            team_role: Some(Capability::Write),
            collaborator_role: Some(Capability::Triage),
            ..Default::default()
        };
        assert_eq!(resolve(facts), Capability::Write);
    }
}
