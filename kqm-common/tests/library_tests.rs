//! Integration tests for the media library engine
//!
//! Each test runs against a fresh on-disk database in a temp directory.

use kqm_common::db::{
    add_star, init_database, remove_star, set_provider_enabled, upsert_provider, Provider,
};
use kqm_common::config::LibraryConfig;
use kqm_common::library::{MediaField, MediaFilter, MediaLibrary, NewMedia};
use kqm_common::Error;
use serde_json::json;
use sqlx::SqlitePool;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlitePool, MediaLibrary) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("library.db")).await.unwrap();

    upsert_provider(&pool, &Provider::new("cdg", 1)).await.unwrap();
    upsert_provider(&pool, &Provider::new("youtube", 2)).await.unwrap();

    let library = MediaLibrary::new(pool.clone());
    (temp_dir, pool, library)
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Insert `n` media rows for one artist in a single statement and return their ids
async fn bulk_insert(pool: &SqlitePool, n: i64) -> Vec<i64> {
    sqlx::query("INSERT INTO artists (name) VALUES ('Bulk Artist')")
        .execute(pool)
        .await
        .unwrap();

    sqlx::query(
        r#"
        WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
        INSERT INTO media (artist_id, title, duration, provider)
        SELECT (SELECT artist_id FROM artists WHERE name = 'Bulk Artist'), 'Song ' || n, 180, 'cdg'
        FROM seq
        "#,
    )
    .bind(n)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query_scalar("SELECT media_id FROM media ORDER BY media_id")
        .fetch_all(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_add_rounds_duration_and_reuses_artist() {
    let (_dir, pool, library) = setup().await;
    upsert_provider(&pool, &Provider::new("P", 3)).await.unwrap();

    let first = library.add(&NewMedia::new("A", "T", 61.6, "P")).await.unwrap();
    let second = library.add(&NewMedia::new("A", "Другая", 200.0, "P")).await.unwrap();
    assert_ne!(first, second);

    let listing = library.get_library().await.unwrap();
    let song = listing.media.get(first).expect("first song listed");
    assert_eq!(song.duration, 62);
    assert_eq!(song.artist, "A");

    assert_eq!(listing.artists.len(), 1, "same name must map to one artist");
    let artist = listing.artists.get(song.artist_id).unwrap();
    assert_eq!(artist.name, "A");
    assert_eq!(artist.media_ids.len(), 2);
    assert_eq!(listing.media.get(second).unwrap().artist_id, song.artist_id);

    assert_eq!(count(&pool, "artists").await, 1);
}

#[tokio::test]
async fn test_add_missing_artist_is_validation_error() {
    let (_dir, pool, library) = setup().await;

    let item = NewMedia {
        title: Some("T".to_string()),
        duration: Some(60.0),
        provider: Some("P".to_string()),
        ..Default::default()
    };

    match library.add(&item).await {
        Err(Error::Validation(msg)) => assert!(msg.contains("\"title\":\"T\""), "{}", msg),
        other => panic!("expected validation error, got {:?}", other),
    }

    assert_eq!(count(&pool, "media").await, 0);
    assert_eq!(count(&pool, "artists").await, 0);
}

#[tokio::test]
async fn test_add_accepts_scanner_json_payload() {
    let (_dir, _pool, library) = setup().await;

    let item: NewMedia = serde_json::from_value(json!({
        "artist": "Queen",
        "title": "Bohemian Rhapsody",
        "duration": 354.2,
        "provider": "cdg",
        "providerData": { "basePath": "/karaoke", "file": "queen/bohemian.mp3" }
    }))
    .unwrap();

    let media_id = library.add(&item).await.unwrap();
    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.get(media_id).unwrap().duration, 354);
}

#[tokio::test]
async fn test_artist_names_are_case_sensitive() {
    let (_dir, pool, library) = setup().await;

    library.add(&NewMedia::new("abba", "Waterloo", 170.0, "cdg")).await.unwrap();
    library.add(&NewMedia::new("ABBA", "Waterloo", 170.0, "cdg")).await.unwrap();

    assert_eq!(count(&pool, "artists").await, 2);
    assert_eq!(library.get_library().await.unwrap().media.len(), 2);
}

#[tokio::test]
async fn test_concurrent_adds_create_one_artist() {
    let (_dir, pool, library) = setup().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let library = library.clone();
        handles.push(tokio::spawn(async move {
            library
                .add(&NewMedia::new("Brand New Artist", format!("Song {}", i), 180.0, "cdg"))
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("concurrent add should succeed");
    }

    assert_eq!(count(&pool, "artists").await, 1);
    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.artists.len(), 1);
    assert_eq!(listing.media.len(), 8);
}

#[tokio::test]
async fn test_listing_never_exposes_provider_data() {
    let (_dir, _pool, library) = setup().await;

    library
        .add(&NewMedia::new("A", "T", 60.0, "cdg").with_provider_data(json!({ "secretPath": "/srv/x.cdg" })))
        .await
        .unwrap();

    let library_json = serde_json::to_string(&library.get_library().await.unwrap()).unwrap();
    let media_json = serde_json::to_string(&library.get_media(&MediaFilter::new()).await.unwrap()).unwrap();

    for json in [library_json, media_json] {
        assert!(!json.contains("providerData"), "{}", json);
        assert!(!json.contains("provider_data"), "{}", json);
        assert!(!json.contains("secretPath"), "{}", json);
    }
}

#[tokio::test]
async fn test_disabled_provider_is_hidden_until_reenabled() {
    let (_dir, pool, library) = setup().await;

    let cdg = library.add(&NewMedia::new("A", "One", 60.0, "cdg")).await.unwrap();
    let yt = library.add(&NewMedia::new("A", "Two", 60.0, "youtube")).await.unwrap();

    set_provider_enabled(&pool, "youtube", false).await.unwrap();
    let listing = library.get_library().await.unwrap();
    assert!(listing.media.contains(cdg));
    assert!(!listing.media.contains(yt));
    assert!(listing.media.iter().all(|m| m.provider != "youtube"));

    let only_yt = library
        .get_media(&MediaFilter::new().equals(MediaField::Provider, "youtube"))
        .await
        .unwrap();
    assert!(only_yt.is_empty());

    set_provider_enabled(&pool, "youtube", true).await.unwrap();
    assert!(library.get_library().await.unwrap().media.contains(yt));
}

#[tokio::test]
async fn test_media_from_unknown_provider_is_not_listed() {
    let (_dir, _pool, library) = setup().await;

    library.add(&NewMedia::new("A", "T", 60.0, "unconfigured")).await.unwrap();
    assert!(library.get_library().await.unwrap().media.is_empty());
}

#[tokio::test]
async fn test_preferred_row_is_representative() {
    let (_dir, _pool, library) = setup().await;

    let _cdg = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    let yt = library
        .add(&NewMedia::new("A", "T", 61.0, "youtube").preferred())
        .await
        .unwrap();

    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.result, vec![yt]);

    let song = listing.media.get(yt).unwrap();
    assert_eq!(song.num_media, 2);
    assert_eq!(song.provider, "youtube");
    assert_eq!(listing.artists.get(song.artist_id).unwrap().media_ids, vec![yt]);
}

#[tokio::test]
async fn test_without_preferred_lowest_priority_then_lowest_id_wins() {
    let (_dir, _pool, library) = setup().await;

    let _yt = library.add(&NewMedia::new("A", "T", 60.0, "youtube")).await.unwrap();
    let cdg_first = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    let _cdg_second = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();

    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.result, vec![cdg_first]);
    assert_eq!(listing.media.get(cdg_first).unwrap().num_media, 2, "two distinct providers");
}

#[tokio::test]
async fn test_disabling_preferred_provider_falls_back() {
    let (_dir, pool, library) = setup().await;

    let cdg = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    let _yt = library
        .add(&NewMedia::new("A", "T", 60.0, "youtube").preferred())
        .await
        .unwrap();

    set_provider_enabled(&pool, "youtube", false).await.unwrap();

    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.result, vec![cdg]);
    assert_eq!(listing.media.get(cdg).unwrap().num_media, 1);
}

#[tokio::test]
async fn test_num_stars_counts_whole_group() {
    let (_dir, pool, library) = setup().await;

    let cdg = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    let yt = library.add(&NewMedia::new("A", "T", 60.0, "youtube")).await.unwrap();
    let other = library.add(&NewMedia::new("A", "Other", 60.0, "cdg")).await.unwrap();

    add_star(&pool, 1, cdg).await.unwrap();
    add_star(&pool, 2, cdg).await.unwrap();
    add_star(&pool, 1, yt).await.unwrap();
    add_star(&pool, 1, yt).await.unwrap(); // duplicate ignored

    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.get(cdg).unwrap().num_stars, 3);
    assert_eq!(listing.media.get(other).unwrap().num_stars, 0);

    remove_star(&pool, 2, cdg).await.unwrap();
    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.get(cdg).unwrap().num_stars, 2);
}

#[tokio::test]
async fn test_listing_sorted_by_artist_then_title() {
    let (_dir, _pool, library) = setup().await;

    let z = library.add(&NewMedia::new("Zebra", "Alpha", 60.0, "cdg")).await.unwrap();
    let b2 = library.add(&NewMedia::new("Beatles", "Yesterday", 60.0, "cdg")).await.unwrap();
    let b1 = library.add(&NewMedia::new("Beatles", "Help", 60.0, "cdg")).await.unwrap();

    let listing = library.get_library().await.unwrap();
    assert_eq!(listing.media.result, vec![b1, b2, z]);

    let artist_names: Vec<&str> = listing.artists.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(artist_names, vec!["Beatles", "Zebra"]);
    assert_eq!(listing.artists.iter().next().unwrap().media_ids, vec![b1, b2]);
}

#[tokio::test]
async fn test_get_media_filters() {
    let (_dir, _pool, library) = setup().await;

    let a = library
        .add(&NewMedia::new("A", "One", 60.0, "cdg").with_provider_data(json!({ "file": "a/one.mp3", "meta": { "disc": 1 } })))
        .await
        .unwrap();
    let b = library
        .add(&NewMedia::new("B", "Two", 90.0, "cdg").with_provider_data(json!({ "file": "b/two.mp3", "meta": { "disc": 2 } })))
        .await
        .unwrap();
    let c = library
        .add(&NewMedia::new("C", "Three", 90.0, "youtube").with_provider_data(json!({ "videoId": "xyz" })))
        .await
        .unwrap();

    let ids = |n: &kqm_common::library::Normalized<_>| n.result.clone();

    let by_provider = library
        .get_media(&MediaFilter::new().equals(MediaField::Provider, "cdg"))
        .await
        .unwrap();
    assert_eq!(ids(&by_provider), vec![a, b]);

    let by_ids = library
        .get_media(&MediaFilter::new().any_of(MediaField::MediaId, [a, c]))
        .await
        .unwrap();
    assert_eq!(ids(&by_ids), vec![a, c]);

    let empty_list_is_noop = library
        .get_media(&MediaFilter::new().any_of(MediaField::MediaId, Vec::<i64>::new()))
        .await
        .unwrap();
    assert_eq!(empty_list_is_noop.len(), 3);

    let by_file = library
        .get_media(&MediaFilter::new().provider_data_equals("file", "b/two.mp3"))
        .await
        .unwrap();
    assert_eq!(ids(&by_file), vec![b]);

    let by_files = library
        .get_media(&MediaFilter::new().provider_data_any_of("file", ["a/one.mp3", "b/two.mp3"]))
        .await
        .unwrap();
    assert_eq!(ids(&by_files), vec![a, b]);

    let nested = library
        .get_media(&MediaFilter::new().provider_data_equals("meta.disc", 2_i64))
        .await
        .unwrap();
    assert_eq!(ids(&nested), vec![b]);

    let combined = library
        .get_media(
            &MediaFilter::new()
                .equals(MediaField::Duration, 90_i64)
                .equals(MediaField::Provider, "youtube"),
        )
        .await
        .unwrap();
    assert_eq!(ids(&combined), vec![c]);
}

#[tokio::test]
async fn test_get_media_from_json_mapping() {
    let (_dir, _pool, library) = setup().await;

    let a = library
        .add(&NewMedia::new("A", "One", 60.0, "cdg").with_provider_data(json!({ "file": "one.mp3" })))
        .await
        .unwrap();
    library.add(&NewMedia::new("A", "Two", 60.0, "cdg")).await.unwrap();

    let filter = MediaFilter::from_json(&json!({
        "provider": "cdg",
        "providerData": { "file": ["one.mp3"], "basePath": [] }
    }))
    .unwrap();

    assert_eq!(library.get_media(&filter).await.unwrap().result, vec![a]);
}

#[tokio::test]
async fn test_remove_2500_ids_in_three_batches() {
    let (_dir, pool, library) = setup().await;
    let library = library.with_batch_size(999);

    let ids = bulk_insert(&pool, 2500).await;
    assert_eq!(ids.len(), 2500);

    let summary = library.remove(&ids).await.unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.deleted, 2500);

    let remaining = library
        .get_media(&MediaFilter::new().any_of(MediaField::MediaId, ids.clone()))
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert_eq!(count(&pool, "media").await, 0);
}

#[tokio::test]
async fn test_configured_batch_size_drives_remove() {
    let (_dir, pool, _library) = setup().await;
    let config = LibraryConfig {
        remove_batch_size: 500,
    };
    let library = MediaLibrary::from_config(pool.clone(), &config);
    assert_eq!(library.remove_batch_size(), 500);

    let ids = bulk_insert(&pool, 2500).await;
    let summary = library.remove(&ids).await.unwrap();

    assert_eq!(summary.batches, 5);
    assert_eq!(summary.deleted, 2500);
    assert_eq!(count(&pool, "media").await, 0);
}

#[tokio::test]
async fn test_oversized_in_list_is_store_error() {
    let (_dir, _pool, library) = setup().await;

    let filter = MediaFilter::new().any_of(MediaField::MediaId, 0..40_000i64);
    let err = library.get_media(&filter).await.unwrap_err();

    assert!(matches!(err, Error::Database(_)), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn test_remove_stops_at_failed_batch() {
    let (_dir, pool, library) = setup().await;
    let library = library.with_batch_size(999);

    let ids = bulk_insert(&pool, 2500).await;
    let poisoned = ids[1500];

    // Any DELETE touching this row aborts, failing the whole second batch
    sqlx::query(&format!(
        "CREATE TRIGGER fail_delete BEFORE DELETE ON media WHEN OLD.media_id = {} \
         BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
        poisoned
    ))
    .execute(&pool)
    .await
    .unwrap();

    let err = library.remove(&ids).await.unwrap_err();
    assert!(matches!(err, Error::Database(_)), "unexpected error: {:?}", err);

    let remaining: Vec<i64> = sqlx::query_scalar("SELECT media_id FROM media ORDER BY media_id")
        .fetch_all(&pool)
        .await
        .unwrap();

    // First batch committed, second rolled back, third never attempted
    assert_eq!(remaining, ids[999..].to_vec());
}

#[tokio::test]
async fn test_remove_empty_input_issues_nothing() {
    let (_dir, _pool, library) = setup().await;
    let summary = library.remove(&[]).await.unwrap();
    assert_eq!(summary.batches, 0);
    assert_eq!(summary.deleted, 0);
}

#[tokio::test]
async fn test_removed_media_ids_are_not_reused() {
    let (_dir, pool, library) = setup().await;

    let first = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    add_star(&pool, 1, first).await.unwrap();
    library.remove(&[first]).await.unwrap();
    assert_eq!(count(&pool, "stars").await, 0, "stars cascade with their media");

    let second = library.add(&NewMedia::new("A", "T", 60.0, "cdg")).await.unwrap();
    assert!(second > first);
}

#[tokio::test]
async fn test_batch_size_is_clamped() {
    let (_dir, _pool, library) = setup().await;
    assert_eq!(library.remove_batch_size(), 999);
    assert_eq!(library.with_batch_size(0).remove_batch_size(), 1);
}
