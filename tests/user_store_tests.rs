mod common;

use common::TestDb;
use wordle_db::WordleError;
use wordle_db::db::schema::{BANNED_USERS, LEADERBOARD, USERS};
use wordle_db::db::{LeaderboardRow, NewLeaderboardEntry, NewUser};

#[tokio::test]
async fn score_for_known_and_unknown_user() {
    let db = TestDb::new("user-scenario").await;
    let store = &db.storage;

    let alice = store
        .create_user(&NewUser::new("Alice", "tg-100"))
        .await
        .expect("user should be created");
    assert_eq!(alice.id, 1);
    assert_eq!(alice.username, None);

    let entry = store
        .create_entry(&NewLeaderboardEntry::new(alice.id, "chat-1").with_score(5))
        .await
        .expect("entry should be created");
    assert_eq!(entry.score, 5);
    assert_eq!(store.entry_user(&entry).await.unwrap(), alice);

    let err = store
        .create_entry(&NewLeaderboardEntry::new(999, "chat-1"))
        .await
        .expect_err("unknown user must be rejected");
    match err {
        WordleError::ReferentialViolation { table } => assert_eq!(table, "leaderboard"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_telegram_id_is_rejected() {
    let db = TestDb::new("user-unique").await;
    let store = &db.storage;

    store.create_user(&NewUser::new("Alice", "tg-100")).await.unwrap();
    let err = store
        .create_user(&NewUser::new("Alicia", "tg-100"))
        .await
        .expect_err("telegram id must be unique");
    match err {
        WordleError::UniquenessViolation { table, column } => {
            assert_eq!(table, "users");
            assert_eq!(column, "telegram_user_id");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(store.count_rows(&USERS).await.unwrap(), 1);
}

#[tokio::test]
async fn upsert_never_duplicates_users() {
    let db = TestDb::new("user-upsert").await;
    let store = &db.storage;

    let first = store
        .upsert_user(&NewUser::new("Alice", "tg-100").with_username("alice"))
        .await
        .unwrap();
    let again = store
        .upsert_user(&NewUser::new("Alice", "tg-100").with_username("alice"))
        .await
        .unwrap();
    assert_eq!(first, again);

    let renamed = store
        .upsert_user(&NewUser::new("Alice B.", "tg-100"))
        .await
        .unwrap();
    assert_eq!(renamed.id, first.id);
    assert_eq!(renamed.name, "Alice B.");
    assert_eq!(renamed.username, None);
    assert_eq!(renamed.created_at, first.created_at);
    assert!(renamed.updated_at > first.updated_at);

    assert_eq!(store.count_rows(&USERS).await.unwrap(), 1);
    assert_eq!(
        store.find_user_by_telegram_id("tg-100").await.unwrap(),
        Some(renamed)
    );
    assert_eq!(store.find_user_by_telegram_id("tg-404").await.unwrap(), None);
}

#[tokio::test]
async fn deleting_a_user_removes_only_their_rows() {
    let db = TestDb::new("user-cascade").await;
    let store = &db.storage;

    let alice = store.create_user(&NewUser::new("Alice", "tg-100")).await.unwrap();
    let bob = store.create_user(&NewUser::new("Bob", "tg-200")).await.unwrap();

    store.add_score(alice.id, "chat-1", 3).await.unwrap();
    store.add_score(alice.id, "chat-2", 1).await.unwrap();
    store.ban_user(alice.id).await.unwrap();
    let bob_entry = store.add_score(bob.id, "chat-1", 2).await.unwrap();
    let bob_ban = store.ban_user(bob.id).await.unwrap();

    store.delete_user(alice.id).await.unwrap();

    assert!(store.user_leaderboard(&alice).await.unwrap().is_empty());
    assert!(store.user_bans(&alice).await.unwrap().is_empty());
    assert!(!store.is_banned(alice.id).await.unwrap());

    assert_eq!(store.user_leaderboard(&bob).await.unwrap(), vec![bob_entry]);
    assert_eq!(store.user_bans(&bob).await.unwrap(), vec![bob_ban]);
    assert_eq!(store.count_rows(&LEADERBOARD).await.unwrap(), 1);
    assert_eq!(store.count_rows(&BANNED_USERS).await.unwrap(), 1);
}

#[tokio::test]
async fn score_defaults_to_zero_and_accumulates() {
    let db = TestDb::new("user-score").await;
    let store = &db.storage;

    let alice = store.create_user(&NewUser::new("Alice", "tg-100")).await.unwrap();
    let entry = store
        .create_entry(&NewLeaderboardEntry::new(alice.id, "chat-1"))
        .await
        .unwrap();
    assert_eq!(entry.score, 0);
    assert_eq!(entry.created_at, entry.updated_at);

    let bumped = store.add_score(alice.id, "chat-1", 4).await.unwrap();
    assert_eq!(bumped.id, entry.id);
    assert_eq!(bumped.score, 4);
    assert!(bumped.updated_at > entry.updated_at);
    assert_eq!(bumped.created_at, entry.created_at);

    let reset = store.set_score(entry.id, 1).await.unwrap();
    assert_eq!(reset.score, 1);
    assert!(reset.updated_at > bumped.updated_at);

    assert!(matches!(
        store.set_score(404, 1).await,
        Err(WordleError::NotFound { ref table, id: 404 }) if table == "leaderboard"
    ));

    let err = store.add_score(999, "chat-1", 1).await.unwrap_err();
    assert!(err.is_referential_violation(), "{err:?}");
}

#[tokio::test]
async fn chat_leaderboard_orders_by_score() {
    let db = TestDb::new("user-ranking").await;
    let store = &db.storage;

    let alice = store
        .create_user(&NewUser::new("Alice", "tg-100").with_username("alice"))
        .await
        .unwrap();
    let bob = store.create_user(&NewUser::new("Bob", "tg-200")).await.unwrap();
    let carol = store.create_user(&NewUser::new("Carol", "tg-300")).await.unwrap();

    store.add_score(alice.id, "chat-1", 2).await.unwrap();
    store.add_score(bob.id, "chat-1", 5).await.unwrap();
    store.add_score(carol.id, "chat-1", 2).await.unwrap();
    store.add_score(carol.id, "chat-2", 50).await.unwrap();

    let rows = store.chat_leaderboard("chat-1", 10).await.unwrap();
    assert_eq!(
        rows,
        vec![
            LeaderboardRow {
                user_id: bob.id,
                name: "Bob".into(),
                username: None,
                score: 5,
            },
            LeaderboardRow {
                user_id: alice.id,
                name: "Alice".into(),
                username: Some("alice".into()),
                score: 2,
            },
            LeaderboardRow {
                user_id: carol.id,
                name: "Carol".into(),
                username: None,
                score: 2,
            },
        ]
    );
    assert_eq!(store.chat_leaderboard("chat-1", 1).await.unwrap().len(), 1);
    assert!(store.chat_leaderboard("chat-3", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn banning_is_idempotent_and_reversible() {
    let db = TestDb::new("user-bans").await;
    let store = &db.storage;

    let alice = store.create_user(&NewUser::new("Alice", "tg-100")).await.unwrap();
    assert!(!store.is_banned(alice.id).await.unwrap());

    let ban = store.ban_user(alice.id).await.unwrap();
    let again = store.ban_user(alice.id).await.unwrap();
    assert_eq!(ban, again);
    assert!(store.is_banned(alice.id).await.unwrap());
    assert_eq!(store.ban_target(&ban).await.unwrap(), alice);

    assert_eq!(store.unban_user(alice.id).await.unwrap(), 1);
    assert_eq!(store.unban_user(alice.id).await.unwrap(), 0);
    assert!(!store.is_banned(alice.id).await.unwrap());

    let err = store.ban_user(999).await.unwrap_err();
    match err {
        WordleError::ReferentialViolation { table } => assert_eq!(table, "banned_users"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn user_name_bounds_and_required_fields() {
    let db = TestDb::new("user-bounds").await;
    let store = &db.storage;

    let long = "x".repeat(256);
    let err = store
        .create_user(&NewUser::new(long.as_str(), "tg-100"))
        .await
        .unwrap_err();
    assert!(matches!(err, WordleError::LengthViolation { ref column, .. } if column == "name"));

    let err = store
        .create_user(&NewUser::new("Alice", "tg-100").with_username(long))
        .await
        .unwrap_err();
    assert!(matches!(err, WordleError::LengthViolation { ref column, .. } if column == "username"));

    let max = "y".repeat(255);
    let ok = store.create_user(&NewUser::new(max.as_str(), "tg-100")).await.unwrap();
    assert_eq!(ok.name.len(), 255);

    let err = sqlx::query("INSERT INTO users (name) VALUES ('Bob')")
        .execute(store.pool())
        .await
        .unwrap_err();
    match WordleError::from(err) {
        WordleError::NotNullViolation { table, column } => {
            assert_eq!(table, "users");
            assert_eq!(column, "telegram_user_id");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(matches!(
        store.get_user(404).await,
        Err(WordleError::NotFound { ref table, id: 404 }) if table == "users"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bans_return_one_record() {
    let db = TestDb::with_connections("user-ban-race", 8).await;
    let alice = db
        .storage
        .create_user(&NewUser::new("Alice", "tg-100"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = db.storage.clone();
            tokio::spawn(async move { store.ban_user(alice.id).await })
        })
        .collect();

    let mut bans = Vec::new();
    for handle in handles {
        bans.push(handle.await.unwrap().expect("every ban call succeeds"));
    }

    assert!(bans.iter().all(|b| *b == bans[0]), "{bans:?}");
    assert_eq!(bans[0].user_id, alice.id);
    assert_eq!(db.storage.count_rows(&BANNED_USERS).await.unwrap(), 1);
}
