use chrono::NaiveDateTime;
use std::sync::Arc;
use tempfile::tempdir;

use logbook_migrator::infrastructure::{
    FsBlobProvider, InMemoryLogbook, InMemoryRemote, InMemoryTargetStore, MigrationMetrics, RemoteCall,
};
use logbook_migrator::migration::{MigrationOptions, MigrationPlan, Migrator};
use logbook_migrator::models::{AttachmentMeta, CommentRecord, SubsystemRef, UserRecord};

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn comment(id: i64, parent: Option<i64>, root_parent: Option<i64>, comment_type: &str) -> CommentRecord {
    CommentRecord {
        id,
        run: Some(1234),
        user_id: Some(7),
        title: Some(format!("Shift report {}", id)),
        body: Some("Beam dump at 03:12".to_string()),
        class: Some("HUMAN".to_string()),
        comment_type: Some(comment_type.to_string()),
        created_at: Some(at("2019-03-15 10:00:00")),
        deleted: false,
        parent,
        root_parent,
    }
}

fn attachment(comment_id: i64, attachment_id: i64, name: &str, mime: &str) -> AttachmentMeta {
    AttachmentMeta {
        comment_id,
        attachment_id,
        file_name: name.to_string(),
        size: Some(100),
        title: Some(name.to_string()),
        content_type: Some(mime.to_string()),
        created_at: Some(at("2019-03-15 10:05:00")),
        deleted: false,
    }
}

#[tokio::test]
async fn test_full_migration_against_in_memory_services() {
    let files = tempdir().unwrap();
    let month = files.path().join("2019-03");
    std::fs::create_dir_all(&month).unwrap();
    std::fs::write(month.join("2_1.txt"), vec![b'x'; 100]).unwrap();

    let source = InMemoryLogbook {
        comments: vec![
            comment(1, None, None, "GENERAL"),
            comment(2, Some(1), Some(1), "HARDWARE"),
            comment(3, Some(2), Some(1), "GENERAL"),
        ],
        subsystems: vec![SubsystemRef { id: 5, name: "TPC".to_string() }],
        comment_subsystems: vec![(1, 5), (3, 5)],
        attachments: vec![
            attachment(2, 1, "notes.txt", "text/plain"),
            // No file on disk: rejected on content type before any read
            attachment(3, 2, "photo.jpg", "image/jpeg"),
        ],
        users: vec![UserRecord { id: 7, username: Some("shifter".to_string()) }],
        runs: vec![],
    };

    let remote = Arc::new(InMemoryRemote::new());
    let target = Arc::new(InMemoryTargetStore::new());
    let metrics = Arc::new(MigrationMetrics::new());
    let migrator = Migrator::new(
        Arc::new(source),
        target.clone(),
        remote.clone(),
        Arc::new(FsBlobProvider::new(files.path())),
        metrics.clone(),
        MigrationOptions::default(),
    );

    let report = migrator
        .run(MigrationPlan {
            subsystems: true,
            users: true,
            comments: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.subsystems_inserted, 1);
    assert_eq!(report.users_inserted, 1);
    let comments = report.comments.unwrap();
    assert_eq!(comments.threads, 1);
    assert_eq!(comments.entries, 3);
    assert!(comments.orphans.is_empty());

    let calls = remote.calls();
    let created: Vec<(i64, Option<(i64, i64)>)> = calls
        .iter()
        .filter_map(|c| match c {
            RemoteCall::CreateLog { id, .. } => Some((*id, None)),
            RemoteCall::CreateReply { id, parent, root, .. } => Some((*id, Some((*parent, *root)))),
            _ => None,
        })
        .collect();
    assert_eq!(created.len(), 3);
    let (first, second, third) = (created[0].0, created[1].0, created[2].0);
    assert_eq!(created[1].1, Some((first, first)));
    assert_eq!(created[2].1, Some((second, first)));

    for id in [first, second, third] {
        assert_eq!(target.creation_time(id), Some(at("2019-03-15 10:00:00")));
    }

    assert_eq!(remote.tag_creations("TPC"), 1);
    assert_eq!(remote.tag_creations("COMMENT_TYPE/GENERAL"), 1);
    assert_eq!(remote.tag_creations("COMMENT_TYPE/HARDWARE"), 1);

    assert!(calls.contains(&RemoteCall::UploadAttachment {
        log_id: second,
        file_name: "notes.txt".to_string(),
        file_mime: "text/plain".to_string(),
    }));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.attachments_uploaded, 1);
    assert_eq!(snapshot.attachments_skipped, 1);
    assert_eq!(snapshot.tag_link_failures, 0);
}
