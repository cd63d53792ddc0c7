//! 聊天服务单元测试
//!
//! 覆盖创建、更新、加入、退出、删除的授权规则与事件发射，
//! 以及聊天列表的游标分页和跨字段搜索。

use std::sync::Arc;
use std::time::Duration;

use domain::{
    Channel, ChatEvent, ChatId, CursorQuery, DomainError, Identity, SortDirection, User,
};

use crate::broadcaster::EventBroadcast;
use crate::clock::SystemClock;
use crate::error::ApplicationError;
use crate::local_broadcast::{EventStream, LocalEventBroadcaster};
use crate::memory::MemoryStore;
use crate::repository::ChatListFilter;
use crate::services::{ChatService, ChatServiceDependencies, LeaveOutcome};
use crate::services::{MessageService, MessageServiceDependencies};

struct Harness {
    store: MemoryStore,
    broadcaster: Arc<LocalEventBroadcaster>,
    chats: ChatService,
    messages: MessageService,
}

fn harness() -> Harness {
    let store = MemoryStore::new();
    let broadcaster = Arc::new(LocalEventBroadcaster::new());
    let repo = Arc::new(store.clone());
    let clock = Arc::new(SystemClock);

    let chats = ChatService::new(ChatServiceDependencies {
        chat_repository: repo.clone(),
        member_repository: repo.clone(),
        clock: clock.clone(),
        broadcaster: broadcaster.clone(),
    });
    let messages = MessageService::new(MessageServiceDependencies {
        chat_repository: repo.clone(),
        member_repository: repo.clone(),
        message_repository: repo,
        clock,
        broadcaster: broadcaster.clone(),
    });

    Harness {
        store,
        broadcaster,
        chats,
        messages,
    }
}

async fn seed_user(harness: &Harness, name: &str) -> User {
    harness
        .store
        .add_user(name, format!("{name}@example.com"))
        .await
}

async fn next_event(stream: &mut EventStream) -> EventBroadcast {
    tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("no event within timeout")
        .expect("broadcaster closed")
}

fn unauthorized<T>(result: &Result<T, ApplicationError>) -> bool {
    matches!(
        result,
        Err(ApplicationError::Domain(DomainError::Unauthorized))
    )
}

#[tokio::test]
async fn create_chat_makes_creator_the_owner() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;

    let mut updates = h.broadcaster.subscribe_channel(Channel::ChatUpdates);
    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();

    assert_eq!(chat.chat.topic, "general");
    assert_eq!(chat.member_count(), 1);
    assert_eq!(chat.owner().unwrap().user.id, alice.id);

    let broadcast = next_event(&mut updates).await;
    assert_eq!(broadcast.channel, Channel::ChatUpdates);
    match broadcast.event {
        ChatEvent::ChatCreated { chat: payload } => {
            assert_eq!(payload, chat);
        }
        other => panic!("expected chat_created, got {other:?}"),
    }
}

#[tokio::test]
async fn create_chat_rejects_blank_topic() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;

    let result = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "   ")
        .await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::InvalidArgument { ref field, .. })) if field == "topic"
    ));
}

#[tokio::test]
async fn update_chat_is_owner_only() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();
    h.chats
        .join_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await
        .unwrap();

    // 第二个加入者不是所有者
    let denied = h
        .chats
        .update_chat(&Identity::user(bob.id.0), chat.chat.id, "hijacked")
        .await;
    assert!(unauthorized(&denied));

    let mut scoped = h
        .broadcaster
        .subscribe_channel(Channel::ChatUpdatesFor(chat.chat.id));
    let updated = h
        .chats
        .update_chat(&Identity::user(alice.id.0), chat.chat.id, "renamed")
        .await
        .unwrap();
    assert_eq!(updated.chat.topic, "renamed");

    let broadcast = next_event(&mut scoped).await;
    assert_eq!(broadcast.event.name(), "chat_updated");
}

#[tokio::test]
async fn super_admin_updates_any_chat() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let root = seed_user(&h, "root").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();

    let updated = h
        .chats
        .update_chat(&Identity::admin(root.id.0), chat.chat.id, "moderated")
        .await
        .unwrap();
    assert_eq!(updated.chat.topic, "moderated");
}

#[tokio::test]
async fn missing_chat_is_reported_before_authorization() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;

    let result = h
        .chats
        .update_chat(&Identity::user(alice.id.0), ChatId::new(404), "topic")
        .await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ChatNotFound))
    ));
}

#[tokio::test]
async fn joining_twice_is_a_conflict() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();

    let joined = h
        .chats
        .join_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await
        .unwrap();
    assert_eq!(joined.member_count(), 2);
    // 加入顺序保持：所有者仍是最早插入的成员
    assert_eq!(joined.owner().unwrap().user.id, alice.id);

    let again = h
        .chats
        .join_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await;
    assert!(matches!(
        again,
        Err(ApplicationError::Domain(DomainError::AlreadyMember))
    ));
}

#[tokio::test]
async fn leave_with_remaining_members_emits_chat_updated() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();
    h.chats
        .join_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await
        .unwrap();

    let mut scoped = h
        .broadcaster
        .subscribe_channel(Channel::ChatUpdatesFor(chat.chat.id));
    let outcome = h
        .chats
        .leave_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await
        .unwrap();

    match outcome {
        LeaveOutcome::Left(remaining) => {
            assert_eq!(remaining.member_count(), 1);
            assert_eq!(remaining.owner().unwrap().user.id, alice.id);
        }
        LeaveOutcome::ChatDeleted => panic!("chat should survive"),
    }
    assert_eq!(next_event(&mut scoped).await.event.name(), "chat_updated");
}

#[tokio::test]
async fn last_leaver_cascades_into_chat_deleted() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "ephemeral")
        .await
        .unwrap();

    let mut updates = h.broadcaster.subscribe_channel(Channel::ChatUpdates);
    let outcome = h
        .chats
        .leave_chat(&Identity::user(alice.id.0), chat.chat.id)
        .await
        .unwrap();
    assert_eq!(outcome, LeaveOutcome::ChatDeleted);

    let broadcast = next_event(&mut updates).await;
    match broadcast.event {
        ChatEvent::ChatDeleted { chat_id } => assert_eq!(chat_id, chat.chat.id),
        other => panic!("expected chat_deleted, got {other:?}"),
    }

    // 聊天本体已经不存在
    let gone = h
        .chats
        .leave_chat(&Identity::user(alice.id.0), chat.chat.id)
        .await;
    assert!(matches!(
        gone,
        Err(ApplicationError::Domain(DomainError::ChatNotFound))
    ));
}

#[tokio::test]
async fn leave_requires_membership() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;

    let chat = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "general")
        .await
        .unwrap();

    let result = h
        .chats
        .leave_chat(&Identity::user(bob.id.0), chat.chat.id)
        .await;
    assert!(unauthorized(&result));
}

#[tokio::test]
async fn delete_chat_needs_sole_membership_or_super_admin() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;
    let root = seed_user(&h, "root").await;

    let solo = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "solo")
        .await
        .unwrap();
    let shared = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "shared")
        .await
        .unwrap();
    h.chats
        .join_chat(&Identity::user(bob.id.0), shared.chat.id)
        .await
        .unwrap();

    // 唯一成员可以自删
    h.chats
        .delete_chat(&Identity::user(alice.id.0), solo.chat.id)
        .await
        .unwrap();

    // 多人聊天对普通成员拒绝删除
    for user in [&alice, &bob] {
        let denied = h
            .chats
            .delete_chat(&Identity::user(user.id.0), shared.chat.id)
            .await;
        assert!(unauthorized(&denied));
    }

    // 超级管理员可以删除任何聊天
    let mut updates = h.broadcaster.subscribe_channel(Channel::ChatUpdates);
    h.chats
        .delete_chat(&Identity::admin(root.id.0), shared.chat.id)
        .await
        .unwrap();
    assert_eq!(next_event(&mut updates).await.event.name(), "chat_deleted");
}

#[tokio::test]
async fn chat_listing_pages_by_cursor_in_both_directions() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    for i in 1..=20 {
        h.chats
            .create_chat(&Identity::user(alice.id.0), &format!("chat-{i}"))
            .await
            .unwrap();
    }

    let filter = ChatListFilter::default();

    let desc = CursorQuery::new(Some(11), 10, SortDirection::Desc).unwrap();
    let page = h.chats.list_chats(&filter, &desc).await.unwrap();
    let ids: Vec<i64> = page.items.iter().map(|c| c.chat.id.0).collect();
    assert_eq!(ids, (1..=10).rev().collect::<Vec<_>>());
    assert_eq!(page.total, 20);

    let asc = CursorQuery::new(Some(15), 10, SortDirection::Asc).unwrap();
    let page = h.chats.list_chats(&filter, &asc).await.unwrap();
    let ids: Vec<i64> = page.items.iter().map(|c| c.chat.id.0).collect();
    assert_eq!(ids, vec![16, 17, 18, 19, 20]);
    assert_eq!(page.total, 20);
}

#[tokio::test]
async fn search_spans_topic_members_and_message_bodies() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = h.store.add_user("bob", "bob@rustlang.org").await;

    let by_topic = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "rust beginners")
        .await
        .unwrap();
    let by_member = h
        .chats
        .create_chat(&Identity::user(bob.id.0), "cooking")
        .await
        .unwrap();
    let by_message = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "random")
        .await
        .unwrap();
    h.messages
        .add_message(
            &Identity::user(alice.id.0),
            by_message.chat.id,
            "rustlings exercise 4 is hard",
        )
        .await
        .unwrap();
    // 对照组，不应命中
    h.chats
        .create_chat(&Identity::user(alice.id.0), "gardening")
        .await
        .unwrap();

    let filter = ChatListFilter {
        member_user_id: None,
        search: Some("rust".to_owned()),
    };
    let query = CursorQuery::first_page(15, SortDirection::Asc).unwrap();
    let page = h.chats.list_chats(&filter, &query).await.unwrap();

    let ids: Vec<ChatId> = page.items.iter().map(|c| c.chat.id).collect();
    assert_eq!(ids, vec![by_topic.chat.id, by_member.chat.id, by_message.chat.id]);
    // total 统计搜索命中的全集
    assert_eq!(page.total, 3);
}

#[tokio::test]
async fn listing_can_filter_by_participant() {
    let h = harness();
    let alice = seed_user(&h, "alice").await;
    let bob = seed_user(&h, "bob").await;

    let joined = h
        .chats
        .create_chat(&Identity::user(alice.id.0), "both")
        .await
        .unwrap();
    h.chats
        .join_chat(&Identity::user(bob.id.0), joined.chat.id)
        .await
        .unwrap();
    h.chats
        .create_chat(&Identity::user(alice.id.0), "alice only")
        .await
        .unwrap();

    let filter = ChatListFilter {
        member_user_id: Some(bob.id),
        search: None,
    };
    let query = CursorQuery::first_page(15, SortDirection::Desc).unwrap();
    let page = h.chats.list_chats(&filter, &query).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].chat.id, joined.chat.id);
}
