//! Organization-hierarchy visibility resolution.
//!
//! Pure functions over snapshots: no I/O, no locking, re-run per request.
//! The hierarchy is three levels (upper / lower / detail); `전체` or an
//! unpopulated level is a wildcard matching everything at that level and
//! below. Values are opaque case-sensitive tokens.

use crate::shared::models::{Agent, User, Visibility, WILDCARD};

/// True when `level` constrains nothing at its position.
fn is_wildcard(level: Option<&str>) -> bool {
    match level {
        None => true,
        Some(v) => v.is_empty() || v == WILDCARD,
    }
}

/// One level of the prefix match: a wildcard on the agent side matches any
/// user value; otherwise the user must carry exactly the agent's value.
fn level_matches(agent_level: Option<&str>, user_level: Option<&str>) -> bool {
    if is_wildcard(agent_level) {
        return true;
    }
    agent_level == user_level
}

/// Whether `user` may see and use `agent`. `manager` is the agent's owning
/// manager record, when it still resolves; an `organization` agent without a
/// resolvable manager is visible to no one but its operators.
///
/// Organization matching requires both sides to carry an upper category: an
/// unscoped user never matches an unscoped manager. Absent position data
/// reads as "no organization", not as a shared one.
pub fn agent_visible_to(user: &User, agent: &Agent, manager: Option<&User>) -> bool {
    let operator = agent.is_operator(&user.id) || user.role.is_master();
    if !agent.is_active && !operator {
        return false;
    }
    if operator {
        return true;
    }

    match agent.visibility {
        Visibility::Public => true,
        Visibility::Organization => {
            // the agent's home organization is inherited from its manager
            let home = manager.and_then(|m| m.upper_category.as_deref());
            match (home, user.upper_category.as_deref()) {
                (Some(home), Some(up)) => home == up,
                _ => false,
            }
        }
        Visibility::Group => {
            level_matches(agent.upper_category.as_deref(), user.upper_category.as_deref())
                && level_matches(agent.lower_category.as_deref(), user.lower_category.as_deref())
                && level_matches(
                    agent.detail_category.as_deref(),
                    user.detail_category.as_deref(),
                )
        }
    }
}

/// The agents `user` may see, in store order. `manager_of` resolves an
/// agent's manager id to the current user record.
pub fn resolve_visible<'a, F>(
    user: &User,
    agents: &'a [Agent],
    mut manager_of: F,
) -> Vec<&'a Agent>
where
    F: FnMut(&str) -> Option<User>,
{
    agents
        .iter()
        .filter(|agent| {
            let manager = manager_of(&agent.manager_id);
            agent_visible_to(user, agent, manager.as_ref())
        })
        .collect()
}

/// Symmetric audience computation for the admin dashboards: every user the
/// agent is visible to.
pub fn qualifying_users<'a>(
    agent: &Agent,
    users: &'a [User],
    manager: Option<&User>,
) -> Vec<&'a User> {
    users
        .iter()
        .filter(|user| agent_visible_to(user, agent, manager))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::UserRole;
    use crate::tests::test_util::setup;
    use chrono::Utc;

    fn user(id: &str, upper: Option<&str>, lower: Option<&str>, detail: Option<&str>) -> User {
        User::new(id, id).with_position(upper, lower, detail)
    }

    fn agent(visibility: Visibility, manager_id: &str) -> Agent {
        let now = Utc::now();
        Agent {
            id: 1,
            name: "학과 도우미".to_string(),
            description: String::new(),
            category: "그룹".to_string(),
            icon: "Bot".to_string(),
            background_color: "blue".to_string(),
            visibility,
            upper_category: None,
            lower_category: None,
            detail_category: None,
            manager_id: manager_id.to_string(),
            editor_ids: vec![],
            document_manager_ids: vec![],
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn group_agent(
        manager_id: &str,
        upper: &str,
        lower: &str,
        detail: &str,
    ) -> Agent {
        let mut a = agent(Visibility::Group, manager_id);
        a.upper_category = Some(upper.to_string());
        a.lower_category = Some(lower.to_string());
        a.detail_category = Some(detail.to_string());
        a
    }

    #[test]
    fn public_agents_visible_regardless_of_position() {
        setup();
        let a = agent(Visibility::Public, "mgr");
        let unscoped = user("u1", None, None, None);
        let scoped = user("u2", Some("인문대학"), Some("국어국문학과"), None);
        assert!(agent_visible_to(&unscoped, &a, None));
        assert!(agent_visible_to(&scoped, &a, None));
    }

    #[test]
    fn group_agent_with_trailing_wildcards_matches_whole_upper_level() {
        setup();
        let a = group_agent("mgr", "공과대학", WILDCARD, WILDCARD);

        let in_org = user("u1", Some("공과대학"), Some("컴퓨터공학과"), Some("소프트웨어전공"));
        let other_org = user("u2", Some("인문대학"), Some("국어국문학과"), None);
        let unscoped = user("u3", None, None, None);

        assert!(agent_visible_to(&in_org, &a, None));
        assert!(!agent_visible_to(&other_org, &a, None));
        assert!(!agent_visible_to(&unscoped, &a, None));
    }

    #[test]
    fn group_agent_exact_level_requires_exact_token() {
        setup();
        let a = group_agent("mgr", "공과대학", "컴퓨터공학과", WILDCARD);

        let same_dept = user("u1", Some("공과대학"), Some("컴퓨터공학과"), Some("소프트웨어전공"));
        let other_dept = user("u2", Some("공과대학"), Some("전자공학과"), None);
        let no_dept = user("u3", Some("공과대학"), None, None);

        assert!(agent_visible_to(&same_dept, &a, None));
        assert!(!agent_visible_to(&other_dept, &a, None));
        assert!(!agent_visible_to(&no_dept, &a, None));
    }

    #[test]
    fn unpopulated_agent_level_behaves_as_wildcard() {
        setup();
        let mut a = agent(Visibility::Group, "mgr");
        a.upper_category = Some("공과대학".to_string());
        // lower/detail left unpopulated

        let deep = user("u1", Some("공과대학"), Some("컴퓨터공학과"), Some("소프트웨어전공"));
        assert!(agent_visible_to(&deep, &a, None));
    }

    #[test]
    fn organization_visibility_follows_the_managers_current_org() {
        setup();
        let a = agent(Visibility::Organization, "mgr");
        let manager = user("mgr", Some("공과대학"), None, None);

        let colleague = user("u1", Some("공과대학"), Some("기계공학과"), None);
        let outsider = user("u2", Some("인문대학"), None, None);
        let unscoped = user("u3", None, None, None);

        assert!(agent_visible_to(&colleague, &a, Some(&manager)));
        assert!(!agent_visible_to(&outsider, &a, Some(&manager)));
        assert!(!agent_visible_to(&unscoped, &a, Some(&manager)));
        // dangling manager reference hides the agent from non-operators
        assert!(!agent_visible_to(&colleague, &a, None));

        // two unscoped positions are not a shared organization
        let unscoped_manager = user("mgr", None, None, None);
        assert!(!agent_visible_to(&unscoped, &a, Some(&unscoped_manager)));
    }

    #[test]
    fn inactive_agent_visible_only_to_operators_and_master() {
        setup();
        let mut a = group_agent("mgr", "공과대학", WILDCARD, WILDCARD);
        a.is_active = false;
        a.editor_ids = vec!["editor".to_string()];

        let in_org = user("u1", Some("공과대학"), None, None);
        let owner = user("mgr", Some("공과대학"), None, None);
        let editor = user("editor", Some("인문대학"), None, None);
        let master = user("root", None, None, None).with_role(UserRole::MasterAdmin);

        assert!(!agent_visible_to(&in_org, &a, None));
        assert!(agent_visible_to(&owner, &a, None));
        assert!(agent_visible_to(&editor, &a, None));
        assert!(agent_visible_to(&master, &a, None));
    }

    #[test]
    fn rescoping_a_user_revokes_group_visibility() {
        setup();
        let a = group_agent("mgr", "공과대학", WILDCARD, WILDCARD);
        let mut u = user("u1", Some("공과대학"), Some("컴퓨터공학과"), None);
        assert!(agent_visible_to(&u, &a, None));

        u.upper_category = Some("인문대학".to_string());
        assert!(!agent_visible_to(&u, &a, None));
    }

    #[test]
    fn resolve_visible_keeps_store_order() {
        setup();
        let mut a1 = agent(Visibility::Public, "mgr");
        a1.id = 10;
        let mut a2 = group_agent("mgr", "인문대학", WILDCARD, WILDCARD);
        a2.id = 11;
        let mut a3 = agent(Visibility::Public, "mgr");
        a3.id = 12;
        let agents = vec![a1, a2, a3];

        let u = user("u1", Some("공과대학"), None, None);
        let visible: Vec<i64> = resolve_visible(&u, &agents, |_| None)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(visible, vec![10, 12]);
    }

    #[test]
    fn qualifying_users_mirrors_visibility() {
        setup();
        let a = group_agent("mgr", "공과대학", WILDCARD, WILDCARD);
        let users = vec![
            user("u1", Some("공과대학"), Some("컴퓨터공학과"), None),
            user("u2", Some("인문대학"), None, None),
            user("mgr", Some("공과대학"), None, None),
        ];
        let audience: Vec<&str> = qualifying_users(&a, &users, None)
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(audience, vec!["u1", "mgr"]);
    }
}
