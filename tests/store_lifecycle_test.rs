//! End-to-end lifecycle scenarios exercising the store, the resolver, and
//! the event bus together.

use agenthub::events::{AgentEvent, EventBus};
use agenthub::shared::errors::StoreError;
use agenthub::shared::models::{
    Direction, NewAgent, NewMessage, NewOrganizationCategory, User, UserRole, Visibility,
    WILDCARD,
};
use agenthub::store::EntityStore;
use agenthub::visibility::resolve_visible;
use agenthub::{assert_err, assert_ok};

fn seeded_store() -> EntityStore {
    let store = EntityStore::in_memory();
    assert_ok!(store.put_user(
        User::new("mgr", "manager")
            .with_role(UserRole::AgentAdmin)
            .with_position(Some("공과대학"), None, None)
    ));
    assert_ok!(store.put_user(
        User::new("eng-student", "student")
            .with_position(Some("공과대학"), Some("컴퓨터공학과"), None)
    ));
    store
}

fn group_agent(manager_id: &str, upper: &str) -> NewAgent {
    NewAgent {
        name: "학과 공지봇".to_string(),
        description: "department notices".to_string(),
        category: "그룹".to_string(),
        icon: "Bot".to_string(),
        background_color: "blue".to_string(),
        visibility: Visibility::Group,
        upper_category: Some(upper.to_string()),
        lower_category: Some(WILDCARD.to_string()),
        detail_category: Some(WILDCARD.to_string()),
        manager_id: manager_id.to_string(),
        editor_ids: vec![],
        document_manager_ids: vec![],
        is_active: true,
    }
}

#[test]
fn rescoping_a_user_revokes_access_to_a_group_agent() {
    let store = seeded_store();
    let agent = assert_ok!(store.create_agent(group_agent("mgr", "공과대학")));

    let agents = store.list_agents();
    let student = assert_ok!(store.get_user("eng-student"));
    let visible = resolve_visible(&student, &agents, |id| store.get_user(id).ok());
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, agent.id);

    // transfer the student to the humanities college
    let mut moved = student;
    moved.upper_category = Some("인문대학".to_string());
    moved.lower_category = None;
    let moved = assert_ok!(store.put_user(moved));

    let visible = resolve_visible(&moved, &agents, |id| store.get_user(id).ok());
    assert!(visible.is_empty());
}

#[test]
fn deleting_an_agent_removes_its_whole_conversation_tree() {
    let store = seeded_store();
    let agent = assert_ok!(store.create_agent(group_agent("mgr", "공과대학")));
    let conversation = assert_ok!(store.get_or_create_conversation("eng-student", agent.id));
    let message = assert_ok!(store.create_message(NewMessage {
        conversation_id: conversation.id,
        content: "시험 일정 알려줘".to_string(),
        direction: Direction::FromUser,
    }));

    assert_ok!(store.delete_agent(agent.id));

    assert!(matches!(
        assert_err!(store.get_conversation(conversation.id)),
        StoreError::NotFound { .. }
    ));
    assert!(matches!(
        assert_err!(store.get_message(message.id)),
        StoreError::NotFound { .. }
    ));
}

#[test]
fn persisted_store_reloads_identically_and_continues_id_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = {
        let store = EntityStore::open(dir.path()).unwrap();
        assert_ok!(store.put_user(
            User::new("mgr", "manager").with_role(UserRole::AgentAdmin)
        ));
        assert_ok!(store.create_agent(group_agent("mgr", "공과대학")));
        let mut second = group_agent("mgr", "공과대학");
        second.name = "두번째".to_string();
        assert_ok!(store.create_agent(second));
        assert_ok!(store.create_category(NewOrganizationCategory {
            upper_category: "공과대학".to_string(),
            lower_category: "컴퓨터공학과".to_string(),
            detail_category: WILDCARD.to_string(),
        }));
        assert_ok!(store.persist());
        store.list_agents()
    };

    let reloaded = EntityStore::open(dir.path()).unwrap();
    assert_eq!(reloaded.list_agents(), snapshot);
    assert_eq!(reloaded.list_categories().len(), 1);

    let next = assert_ok!(reloaded.create_agent(group_agent("mgr", "공과대학")));
    assert_eq!(next.id, 3);
}

#[tokio::test]
async fn agent_mutations_can_notify_live_sessions() {
    let store = seeded_store();
    let bus = EventBus::new();
    let mut rx = bus.subscribe();

    let agent = assert_ok!(store.create_agent(group_agent("mgr", "공과대학")));
    assert_eq!(bus.publish(AgentEvent::agent_update(agent.id)), 1);

    let AgentEvent::AgentUpdate { agent_id, .. } = rx.recv().await.unwrap();
    assert_eq!(agent_id, agent.id);

    // no session left: publishing is still fine and reports zero deliveries
    drop(rx);
    assert_eq!(bus.publish(AgentEvent::agent_update(agent.id)), 0);
}

#[test]
fn bulk_rows_respect_referential_integrity() {
    let store = seeded_store();
    let good = group_agent("mgr", "공과대학");
    let mut bad = group_agent("ghost-manager", "공과대학");
    bad.name = "주인 없는 봇".to_string();

    assert_ok!(store.create_agent(good));
    let err = assert_err!(store.create_agent(bad));
    assert!(matches!(err, StoreError::Validation(_)));
    assert_eq!(store.list_agents().len(), 1);
}
